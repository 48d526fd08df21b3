//! Everything without a dedicated handler gets a fixed "unsupported" reply.

use super::messages::UNSUPPORTED_EVENT;
use super::{HandlerContext, HandlerError};
use crate::gateway::{Event, EventHandler};
use async_trait::async_trait;
use std::sync::Arc;

/// Answers any event without a dedicated handler.
pub struct FallbackHandler {
    ctx: Arc<HandlerContext>,
}

impl FallbackHandler {
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl EventHandler for FallbackHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        if event.reply_token.is_none() {
            // follow/unfollow/leave and similar carry nothing to answer
            log::info!("fallback: ignoring {} event without reply token", event.kind_name());
            return Ok(());
        }
        self.ctx.reply(event, UNSUPPORTED_EVENT).await
    }
}
