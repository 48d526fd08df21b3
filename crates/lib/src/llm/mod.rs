//! Vision and chat model collaborators, and the Gemini client that implements both.
//!
//! Every call either answers with text or fails with one of three distinguishable errors:
//! deadline exceeded, service error, or malformed response.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
    #[error("model service error: {0}")]
    Service(String),
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

/// Who said a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

/// One turn of a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

/// Reads an image with a prompt and answers in free text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn classify_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, LlmError>;
}

/// Answers `text` given the prior turns of the caller's session.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn converse(&self, history: &[ChatTurn], text: &str) -> Result<String, LlmError>;
}
