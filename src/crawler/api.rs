//! Remote posts API client
//!
//! This module handles all HTTP requests to the blogging API, including:
//! - Building one HTTP client per attached proxy
//! - Assembling the posts request for a blog and offset
//! - Classifying each response into an `ApiOutcome`
//!
//! Classification is a pure function of the HTTP status and the body so the retry
//! policy in the state machine can be tested without a network.

use crate::config::Config;
use crate::pool::EgressEntry;
use crate::state::{HttpMeta, UpdatePayload};
use regex::Regex;
use reqwest::{redirect::Policy, Client};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Marker the remote embeds in bodies when it is shedding load
pub const SERVICE_UNAVAILABLE: &str = "Service is temporarily unavailable";

/// Outcome of one posts request
#[derive(Debug, Clone)]
pub enum ApiOutcome {
    /// A usable page
    Page(UpdatePayload),

    /// 403/404 or "Not Found": the blog is gone
    Gone(HttpMeta),

    /// 401 or "Unauthorized": the key was rejected
    Unauthorized(HttpMeta),

    /// 429 or "Limit Exceeded": the key is over its quota
    RateLimited(HttpMeta),

    /// The remote is shedding load
    ServiceUnavailable,

    /// Body could not be decoded even after salvage
    Malformed { status: u16, reason: String },

    /// Any other non-success answer
    Other(HttpMeta),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    meta: Option<Meta>,
    response: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    status: Option<u16>,
    msg: Option<String>,
}

/// Builds posts requests against the configured API
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    reblog_info: bool,
    notes_info: bool,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.api.timeout_secs),
            reblog_info: config.crawler.reblog_info,
            notes_info: config.crawler.notes_info,
        }
    }

    /// HTTP client for requests through `egress`, or a direct one
    pub fn client_for(&self, egress: Option<&EgressEntry>) -> reqwest::Result<Client> {
        match egress {
            Some(entry) => entry.build_client(self.timeout),
            None => Client::builder()
                .user_agent(concat!("blog-harvester/", env!("CARGO_PKG_VERSION")))
                .timeout(self.timeout)
                .connect_timeout(self.timeout.min(Duration::from_secs(10)))
                .redirect(Policy::limited(5))
                .gzip(true)
                .brotli(true)
                .build(),
        }
    }

    /// Endpoint for the posts of `blog`
    pub fn posts_url(&self, blog: &str) -> String {
        format!("{}/blog/{}/posts", self.base_url, blog)
    }

    /// Query parameters for one posts request; `offset` is always sent
    pub fn posts_query(&self, offset: u64, api_key: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![("offset", offset.to_string())];
        if self.reblog_info {
            query.push(("reblog_info", "true".to_string()));
        }
        if self.notes_info {
            query.push(("notes_info", "true".to_string()));
        }
        query.push(("api_key", api_key.to_string()));
        query
    }

    /// Fetches one page of posts
    ///
    /// `Err` means the request never produced a response (connect, proxy or
    /// timeout failure); every answer from the remote is classified instead.
    pub async fn fetch_posts(
        &self,
        client: &Client,
        blog: &str,
        offset: u64,
        api_key: &str,
    ) -> reqwest::Result<ApiOutcome> {
        let response = client
            .get(self.posts_url(blog))
            .query(&self.posts_query(offset, api_key))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(classify(status, &body))
    }
}

/// Classifies a response by HTTP status and body
pub fn classify(status: u16, body: &str) -> ApiOutcome {
    if body.contains(SERVICE_UNAVAILABLE) {
        return ApiOutcome::ServiceUnavailable;
    }

    let envelope = serde_json::from_str::<Envelope>(body)
        .ok()
        .or_else(|| salvage(body));

    let (code, message, response) = match envelope {
        Some(envelope) => {
            let meta_status = envelope.meta.as_ref().and_then(|m| m.status);
            let message = envelope
                .meta
                .and_then(|m| m.msg)
                .unwrap_or_default();
            // A success at HTTP level may still carry an error in `meta`
            let code = match meta_status {
                Some(meta_status) if (200..300).contains(&status) => meta_status,
                _ => status,
            };
            (code, message, envelope.response)
        }
        None => (status, String::new(), None),
    };

    let meta = HttpMeta {
        status: code,
        message: message.clone(),
    };

    if code == 403 || code == 404 || message.contains("Not Found") {
        return ApiOutcome::Gone(meta);
    }
    if code == 401 || message.contains("Unauthorized") {
        return ApiOutcome::Unauthorized(meta);
    }
    if code == 429 || message.contains("Limit Exceeded") {
        return ApiOutcome::RateLimited(meta);
    }

    if !(200..300).contains(&code) {
        return ApiOutcome::Other(meta);
    }

    match response.as_ref().and_then(|r| payload_from_response(meta, r)) {
        Some(payload) => ApiOutcome::Page(payload),
        None => ApiOutcome::Malformed {
            status: code,
            reason: "response is missing blog metadata".to_string(),
        },
    }
}

fn payload_from_response(meta: HttpMeta, response: &Value) -> Option<UpdatePayload> {
    let blog = response.get("blog")?;
    let total_posts = blog.get("total_posts").and_then(Value::as_u64)?;
    let updated = blog.get("updated").and_then(Value::as_i64).unwrap_or(0);
    let posts_response = response
        .get("posts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Some(UpdatePayload {
        valid: true,
        http_meta: meta,
        total_posts,
        updated,
        posts_response,
    })
}

/// Recovers an envelope from a damaged body
///
/// First tries the text between the outermost braces (proxies sometimes wrap or
/// prefix the JSON), then falls back to pulling `meta.status`/`meta.msg` out with
/// a pattern so at least the status can drive the retry policy.
fn salvage(body: &str) -> Option<Envelope> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end > start {
        if let Ok(envelope) = serde_json::from_str::<Envelope>(&body[start..=end]) {
            return Some(envelope);
        }
    }

    let status_re = Regex::new(r#""status"\s*:\s*(\d{3})"#).ok()?;
    let msg_re = Regex::new(r#""msg"\s*:\s*"([^"]*)""#).ok()?;

    let status = status_re
        .captures(body)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok());
    let msg = msg_re
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    if status.is_none() && msg.is_none() {
        return None;
    }

    Some(Envelope {
        meta: Some(Meta { status, msg }),
        response: None,
    })
}
