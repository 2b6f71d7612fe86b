//! URL extraction and normalization for post content

use crate::content::html::strip_html;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Matches percent-encoded URLs, plain URLs and bare domains, in that priority
const URL_PATTERN: &str = r#"(?i)https?%3A%2F%2F[^\s"'<>]+|https?://[^\s"'<>]+|\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,24}\b(?:/[^\s"'<>]*)?"#;

/// Characters commonly glued to the end of a URL by surrounding prose
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '\''];

/// Text and unique URLs extracted from one post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub text: String,
    /// Decoded URLs in first-seen order, without duplicates
    pub urls: Vec<String>,
}

/// Turns raw post content into normalized text and a deduplicated URL list
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    blacklisted_domains: Vec<String>,
    pattern: Regex,
}

impl ContentExtractor {
    /// Creates an extractor that drops URLs containing any of `blacklisted_domains`
    pub fn new(blacklisted_domains: Vec<String>) -> Self {
        let blacklisted_domains = blacklisted_domains
            .into_iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        Self {
            blacklisted_domains,
            // The pattern is a compile-time constant
            pattern: Regex::new(URL_PATTERN).expect("URL pattern is valid"),
        }
    }

    /// Extracts text and URLs from raw (possibly HTML) content
    pub fn extract(&self, raw: &str) -> ExtractedContent {
        ExtractedContent {
            text: strip_html(raw),
            urls: self.extract_urls(raw),
        }
    }

    /// Scans `raw` for URLs
    ///
    /// Every match is checked against the deny-list both before and after redirect
    /// unwrapping and percent-decoding, so no returned URL contains a denied substring.
    pub fn extract_urls(&self, raw: &str) -> Vec<String> {
        let mut seen_raw: HashSet<&str> = HashSet::new();
        let mut seen_decoded: HashSet<String> = HashSet::new();
        let mut urls = Vec::new();

        for found in self.pattern.find_iter(raw) {
            let candidate = found.as_str().trim_end_matches(TRAILING_PUNCTUATION);
            if candidate.is_empty() || !seen_raw.insert(candidate) {
                continue;
            }
            if self.is_denied(candidate) {
                tracing::trace!("Dropping denylisted URL {}", candidate);
                continue;
            }

            let resolved = resolve(candidate);
            if resolved.is_empty() || self.is_denied(&resolved) {
                continue;
            }

            if seen_decoded.insert(resolved.clone()) {
                urls.push(resolved);
            }
        }

        urls
    }

    /// True if `url` contains any deny-listed substring
    pub fn is_denied(&self, url: &str) -> bool {
        let lowered = url.to_lowercase();
        self.blacklisted_domains
            .iter()
            .any(|domain| lowered.contains(domain.as_str()))
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Unwraps redirect wrappers and percent-decodes a matched URL
fn resolve(candidate: &str) -> String {
    if let Some(target) = unwrap_redirect(candidate) {
        return target;
    }

    let decoded = percent_decode(candidate);
    unwrap_redirect(&decoded).unwrap_or(decoded)
}

/// Returns the wrapped target of a known redirect wrapper, already decoded
///
/// Handles `t.umblr.com/redirect?z=<target>` and `href.li/?<target>`.
fn unwrap_redirect(candidate: &str) -> Option<String> {
    let url = Url::parse(candidate).ok()?;
    let host = url.host_str()?.to_lowercase();

    let target = match host.as_str() {
        "t.umblr.com" if url.path().starts_with("/redirect") => url
            .query_pairs()
            .find(|(key, _)| key == "z")
            .map(|(_, value)| value.into_owned())?,
        "href.li" => percent_decode(url.query()?),
        _ => return None,
    };

    let target = target.trim().to_string();
    (!target.is_empty()).then_some(target)
}

fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}
