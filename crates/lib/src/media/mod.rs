//! Video frame sampling. Decoding is delegated to an external ffmpeg binary.

mod frames;

pub use frames::FfmpegFrameExtractor;

use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame extraction failed: {0}")]
    Extract(String),
}

/// Samples frames from a video file.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// JPEG bytes of every `every_nth` frame (frames `every_nth`, `2 * every_nth`, ... counting
    /// from 1), in order.
    async fn extract(&self, video: &Path, every_nth: u32) -> Result<Vec<Vec<u8>>, MediaError>;
}
