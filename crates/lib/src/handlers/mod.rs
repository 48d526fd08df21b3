//! Event handlers: text chat and commands, image OCR, video sampling, and the fallback.
//!
//! Handlers own their user-visible replies. When a collaborator fails they still answer the
//! user with a short apology, then return the error so the gateway can log and count it.

mod fallback;
mod image;
pub mod messages;
mod text;
mod video;

pub use fallback::FallbackHandler;
pub use image::ImageHandler;
pub use text::TextHandler;
pub use video::VideoHandler;

use crate::channels::{Messenger, MessagingError};
use crate::config::VideoConfig;
use crate::gateway::{Event, EventKind, HandlerRegistry};
use crate::llm::{ChatModel, LlmError, VisionModel};
use crate::media::{FrameExtractor, MediaError};
use crate::session::SessionStore;
use crate::storage::{Recorder, StorageError};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("video scratch file: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not configured")]
    Unavailable(&'static str),
    #[error("event has no {0}")]
    MissingField(&'static str),
    #[error("handler received unexpected {0} event")]
    UnexpectedEvent(String),
}

/// Collaborators shared by every handler. Built once at startup.
pub struct HandlerContext {
    pub messenger: Arc<dyn Messenger>,
    /// `None` when no model API key is configured.
    pub vision: Option<Arc<dyn VisionModel>>,
    pub chat: Option<Arc<dyn ChatModel>>,
    pub sessions: Arc<SessionStore>,
    pub recorder: Arc<Recorder>,
    pub frames: Arc<dyn FrameExtractor>,
    pub video: VideoConfig,
    pub report_limit: usize,
}

impl HandlerContext {
    fn vision(&self) -> Result<&Arc<dyn VisionModel>, HandlerError> {
        self.vision
            .as_ref()
            .ok_or(HandlerError::Unavailable("vision model"))
    }

    /// Reply through the event's reply token.
    async fn reply(&self, event: &Event, text: &str) -> Result<(), HandlerError> {
        let token = event
            .reply_token
            .as_deref()
            .ok_or(HandlerError::MissingField("reply token"))?;
        self.messenger.reply(token, text).await?;
        Ok(())
    }
}

/// Handler table for the gateway: text, image and video, with the fallback for the rest.
pub fn build_registry(ctx: Arc<HandlerContext>) -> HandlerRegistry {
    HandlerRegistry::new(Arc::new(FallbackHandler::new(ctx.clone())))
        .register(EventKind::Text, Arc::new(TextHandler::new(ctx.clone())))
        .register(EventKind::Image, Arc::new(ImageHandler::new(ctx.clone())))
        .register(EventKind::Video, Arc::new(VideoHandler::new(ctx)))
}
