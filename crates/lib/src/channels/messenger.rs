//! Messenger trait: reply, push, and media fetch for a messaging platform.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("messaging request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("messaging api error: {0}")]
    Api(String),
}

/// Binary content of a media message.
#[derive(Debug, Clone)]
pub struct MediaContent {
    pub bytes: Vec<u8>,
    /// Content-Type reported by the platform, if any.
    pub content_type: Option<String>,
}

impl MediaContent {
    /// Content type, or `fallback` when the platform did not send one.
    pub fn mime_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.content_type
            .as_deref()
            .map(|c| c.split(';').next().unwrap_or(c).trim())
            .filter(|c| !c.is_empty())
            .unwrap_or(fallback)
    }
}

/// Outbound side of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Download the binary content of a media message.
    async fn fetch_media(&self, content_id: &str) -> Result<MediaContent, MessagingError>;

    /// Answer an event through its single-use reply token.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), MessagingError>;

    /// Send a message to a user, group or room outside the reply window.
    async fn push(&self, to: &str, text: &str) -> Result<(), MessagingError>;
}
