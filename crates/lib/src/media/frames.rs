//! ffmpeg-backed frame extractor. No shell is used; arguments are passed as a list.

use crate::media::{FrameExtractor, MediaError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Runs `ffmpeg` to write sampled frames as JPEG into a scratch directory, then reads them
/// back in frame order. The scratch directory is removed when extraction returns.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    binary: PathBuf,
}

impl FfmpegFrameExtractor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// `select` filter keeping 1-based frames divisible by `every_nth`.
fn select_filter(every_nth: u32) -> String {
    format!("select=not(mod(n+1\\,{}))", every_nth.max(1))
}

fn ffmpeg_args(video: &Path, every_nth: u32, out_pattern: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(video.as_os_str().to_owned());
    for a in ["-vf", &select_filter(every_nth), "-vsync", "vfr", "-q:v", "2"] {
        args.push(OsString::from(a));
    }
    args.push(out_pattern.as_os_str().to_owned());
    args
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(&self, video: &Path, every_nth: u32) -> Result<Vec<Vec<u8>>, MediaError> {
        let scratch = tempfile::tempdir()?;
        let pattern = scratch.path().join("frame_%06d.jpg");
        let output = Command::new(&self.binary)
            .args(ffmpeg_args(video, every_nth, &pattern))
            .output()
            .await
            .map_err(|e| {
                MediaError::Extract(format!("running {}: {}", self.binary.display(), e))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::Extract(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let mut paths = Vec::new();
        let mut dir = tokio::fs::read_dir(scratch.path()).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "jpg") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            frames.push(tokio::fs::read(&path).await?);
        }
        log::debug!(
            "ffmpeg: sampled {} frame(s) from {}",
            frames.len(),
            video.display()
        );
        Ok(frames)
    }
}
