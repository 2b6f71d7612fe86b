use serde_json::Value;

/// Status line reported by the remote, both at HTTP level and inside `meta`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMeta {
    pub status: u16,
    pub message: String,
}

/// Result of one fetch, created per attempt and dropped after persistence
#[derive(Debug, Clone)]
pub struct UpdatePayload {
    /// The body parsed into the expected shape
    pub valid: bool,
    pub http_meta: HttpMeta,
    pub total_posts: u64,
    /// Epoch seconds of the blog's last update
    pub updated: i64,
    /// Raw post records in the order the remote returned them
    pub posts_response: Vec<Value>,
}

impl UpdatePayload {
    /// Payload for a response that could not be used
    pub fn invalid(status: u16, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            http_meta: HttpMeta {
                status,
                message: message.into(),
            },
            total_posts: 0,
            updated: 0,
            posts_response: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.posts_response.is_empty()
    }
}
