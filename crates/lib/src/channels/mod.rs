//! Messaging platform collaborators (LINE).
//!
//! Handlers reply, push and fetch media through the `Messenger` trait so they can be
//! exercised without the platform.

mod line;
mod messenger;

pub use line::{LineClient, LINE_TEXT_LIMIT};
pub use messenger::{MediaContent, Messenger, MessagingError};
