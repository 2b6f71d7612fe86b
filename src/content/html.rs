//! Best-effort HTML to text conversion
//!
//! Post bodies arrive as HTML fragments. Text nodes are kept, `script` and `style`
//! contents are dropped, and anchor/image targets are appended so the URL scan
//! still sees them. Malformed markup is parsed leniently by `scraper`; whatever
//! survives is returned as-is.

use scraper::{Html, Selector};

/// Elements whose text content is never part of the post text
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Strips tags from `raw`, returning whitespace-collapsed text
///
/// Input without any `<` is returned with whitespace collapsed and nothing else.
pub fn strip_html(raw: &str) -> String {
    if !raw.contains('<') {
        return collapse_whitespace(raw);
    }

    let fragment = Html::parse_fragment(raw);
    let mut pieces: Vec<String> = Vec::new();

    for node in fragment.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let skipped = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|e| e.name().to_string()))
            .map(|name| SKIPPED_ELEMENTS.contains(&name.as_str()))
            .unwrap_or(false);
        if skipped {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }
    }

    pieces.extend(link_targets(&fragment));
    collapse_whitespace(&pieces.join(" "))
}

/// `href`/`src` values of anchors and images, in document order
fn link_targets(fragment: &Html) -> Vec<String> {
    let mut targets = Vec::new();

    if let Ok(selector) = Selector::parse("a[href], img[src]") {
        for element in fragment.select(&selector) {
            let value = element
                .value()
                .attr("href")
                .or_else(|| element.value().attr("src"));
            if let Some(target) = value {
                let target = target.trim();
                if !target.is_empty() && !target.starts_with('#') {
                    targets.push(target.to_string());
                }
            }
        }
    }

    targets
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
