//! Conversion of raw API post records into storable posts
//!
//! # Field priority
//!
//! Text-bearing fields are concatenated in this fixed order:
//!
//! 1. `body`, `caption`, `text`, `source`, `description`, `question`, `answer`, `comment`
//! 2. `reblog.comment`, `reblog.tree_html`
//! 3. `trail[].content_raw` (falling back to `trail[].content`)
//!
//! When none of the top-level fields in (1) are present, the same field names are
//! read from the `reblog` sub-object instead. Identical values are only included
//! once, so a comment repeated in the reblog object does not double its URLs.

use crate::content::ContentExtractor;
use serde_json::Value;

/// Top-level text fields, in priority order
pub const TEXT_FIELDS: &[&str] = &[
    "body",
    "caption",
    "text",
    "source",
    "description",
    "question",
    "answer",
    "comment",
];

/// Fields always read from the `reblog` sub-object after the top-level ones
pub const REBLOG_FIELDS: &[&str] = &["comment", "tree_html"];

/// Who authored the content of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribution {
    /// Posted by the blog itself
    Original,
    /// Reblogged from the blog's own earlier post
    SelfReblog,
    /// Reblogged from another blog
    ForeignReblog,
    /// Reblog markers present but the source blog is not named
    Undetermined,
}

impl Attribution {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::SelfReblog => "self_reblog",
            Self::ForeignReblog => "foreign_reblog",
            Self::Undetermined => "undetermined",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "original" => Some(Self::Original),
            "self_reblog" => Some(Self::SelfReblog),
            "foreign_reblog" => Some(Self::ForeignReblog),
            "undetermined" => Some(Self::Undetermined),
            _ => None,
        }
    }
}

/// A post ready to be handed to the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    /// Remote post id
    pub id: String,
    pub blog_name: String,
    pub post_url: Option<String>,
    pub post_type: String,
    /// Epoch seconds
    pub timestamp: i64,
    pub content: String,
    pub urls: Vec<String>,
    pub tags: Vec<String>,
    pub note_count: u64,
    pub reblogged_from: Option<String>,
    pub attribution: Attribution,
}

impl NewPost {
    /// Builds a post from a raw record; `None` if the record has no id
    pub fn from_value(blog: &str, record: &Value, extractor: &ContentExtractor) -> Option<Self> {
        let id = post_id(record)?;
        let extracted = extractor.extract(&raw_content(record));
        let attribution = attribution(blog, record);

        if attribution == Attribution::Undetermined {
            tracing::debug!(
                blog = %blog,
                post = %id,
                "Reblog without a named source; attribution left undetermined"
            );
        }

        Some(Self {
            id,
            blog_name: blog.to_string(),
            post_url: str_field(record, "post_url"),
            post_type: str_field(record, "type").unwrap_or_else(|| "unknown".to_string()),
            timestamp: record.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
            content: extracted.text,
            urls: extracted.urls,
            tags: record
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            note_count: record.get("note_count").and_then(Value::as_u64).unwrap_or(0),
            reblogged_from: non_empty_str(record, "reblogged_from_name"),
            attribution,
        })
    }
}

/// Concatenates the text-bearing fields of a record in priority order
pub fn raw_content(record: &Value) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let top_level = collect_fields(record, TEXT_FIELDS);
    let reblog = record.get("reblog");

    if top_level.is_empty() {
        if let Some(reblog) = reblog {
            extend_unique(&mut parts, collect_fields(reblog, TEXT_FIELDS));
        }
    } else {
        extend_unique(&mut parts, top_level);
    }

    if let Some(reblog) = reblog {
        extend_unique(&mut parts, collect_fields(reblog, REBLOG_FIELDS));
    }

    if let Some(trail) = record.get("trail").and_then(Value::as_array) {
        let trail_content = trail.iter().filter_map(|entry| {
            entry
                .get("content_raw")
                .or_else(|| entry.get("content"))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        });
        extend_unique(&mut parts, trail_content.collect());
    }

    parts.join("\n")
}

/// Decides the attribution of a record relative to `blog`
pub fn attribution(blog: &str, record: &Value) -> Attribution {
    if let Some(source) = non_empty_str(record, "reblogged_from_name") {
        return if source.eq_ignore_ascii_case(blog) {
            Attribution::SelfReblog
        } else {
            Attribution::ForeignReblog
        };
    }

    let has_marker = ["reblogged_from_id", "reblogged_root_id", "reblogged_root_name"]
        .iter()
        .any(|key| record.get(*key).map(|v| !v.is_null()).unwrap_or(false))
        || record
            .get("reblog")
            .and_then(|r| r.get("tree_html"))
            .and_then(Value::as_str)
            .map(|html| !html.trim().is_empty())
            .unwrap_or(false);

    if has_marker {
        Attribution::Undetermined
    } else {
        Attribution::Original
    }
}

fn collect_fields<'a>(object: &'a Value, fields: &[&str]) -> Vec<&'a str> {
    fields
        .iter()
        .filter_map(|field| object.get(*field).and_then(Value::as_str))
        .filter(|value| !value.trim().is_empty())
        .collect()
}

fn extend_unique<'a>(parts: &mut Vec<&'a str>, values: Vec<&'a str>) {
    for value in values {
        if !parts.contains(&value) {
            parts.push(value);
        }
    }
}

fn post_id(record: &Value) -> Option<String> {
    if let Some(id) = non_empty_str(record, "id_string") {
        return Some(id);
    }
    match record.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn str_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}

fn non_empty_str(record: &Value, key: &str) -> Option<String> {
    str_field(record, key).filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_priority_order() {
        let record = json!({
            "comment": "third",
            "body": "first",
            "caption": "second",
        });
        assert_eq!(raw_content(&record), "first\nsecond\nthird");
    }

    #[test]
    fn test_reblog_object_used_when_top_level_absent() {
        let record = json!({
            "reblog": { "body": "from reblog", "comment": "note" },
        });
        assert_eq!(raw_content(&record), "from reblog\nnote");
    }

    #[test]
    fn test_reblog_comment_and_trail_follow_top_level() {
        let record = json!({
            "caption": "cap",
            "reblog": { "comment": "cap", "tree_html": "<p>tree</p>" },
            "trail": [{ "content_raw": "<p>raw</p>" }, { "content": "<p>fallback</p>" }],
        });
        assert_eq!(
            raw_content(&record),
            "cap\n<p>tree</p>\n<p>raw</p>\n<p>fallback</p>"
        );
    }

    #[test]
    fn test_attribution() {
        assert_eq!(attribution("me", &json!({})), Attribution::Original);
        assert_eq!(
            attribution("me", &json!({ "reblogged_from_name": "me" })),
            Attribution::SelfReblog
        );
        assert_eq!(
            attribution("me", &json!({ "reblogged_from_name": "other" })),
            Attribution::ForeignReblog
        );
        assert_eq!(
            attribution("me", &json!({ "reblogged_root_name": "other" })),
            Attribution::Undetermined
        );
        assert_eq!(
            attribution("me", &json!({ "reblog": { "tree_html": "<p>x</p>" } })),
            Attribution::Undetermined
        );
    }

    #[test]
    fn test_attribution_db_roundtrip() {
        for a in [
            Attribution::Original,
            Attribution::SelfReblog,
            Attribution::ForeignReblog,
            Attribution::Undetermined,
        ] {
            assert_eq!(Attribution::from_db_string(a.to_db_string()), Some(a));
        }
    }

    #[test]
    fn test_new_post_from_value() {
        let extractor = ContentExtractor::default();
        let record = json!({
            "id": 12345,
            "type": "text",
            "timestamp": 1700000000,
            "post_url": "https://staff.example.com/post/12345",
            "body": "<p>Hello <a href=\"https://example.com/x\">link</a></p>",
            "tags": ["one", "two"],
            "note_count": 7,
            "reblogged_from_name": "friend",
        });

        let post = NewPost::from_value("staff", &record, &extractor).unwrap();
        assert_eq!(post.id, "12345");
        assert_eq!(post.post_type, "text");
        assert_eq!(post.timestamp, 1_700_000_000);
        assert_eq!(post.urls, vec!["https://example.com/x"]);
        assert_eq!(post.tags, vec!["one", "two"]);
        assert_eq!(post.note_count, 7);
        assert_eq!(post.reblogged_from.as_deref(), Some("friend"));
        assert_eq!(post.attribution, Attribution::ForeignReblog);
    }

    #[test]
    fn test_record_without_id_is_skipped() {
        let extractor = ContentExtractor::default();
        assert!(NewPost::from_value("staff", &json!({ "body": "x" }), &extractor).is_none());
    }

    #[test]
    fn test_id_string_preferred() {
        let record = json!({ "id": 1, "id_string": "900719925474099312" });
        assert_eq!(post_id(&record).as_deref(), Some("900719925474099312"));
    }
}
