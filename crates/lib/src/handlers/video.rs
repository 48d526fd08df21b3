//! Video messages: acknowledge at once, sample frames, read plates, push a summary.

use super::messages;
use super::{HandlerContext, HandlerError};
use crate::gateway::{Event, EventHandler, EventPayload};
use crate::plate::{parse_frame_answer, PlateReading};
use crate::storage::{MediaKind, PlateRecord};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

pub struct VideoHandler {
    ctx: Arc<HandlerContext>,
}

impl VideoHandler {
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        Self { ctx }
    }

    /// Unique readings in first-seen order. Each new reading is recorded as it is found.
    async fn scan(
        &self,
        content_id: &str,
        source: &str,
    ) -> Result<Vec<PlateReading>, HandlerError> {
        let vision = self.ctx.vision()?;
        let media = self.ctx.messenger.fetch_media(content_id).await?;

        // removed on drop, whichever way this returns
        let scratch = tempfile::Builder::new()
            .prefix("lineplate-")
            .suffix(".mp4")
            .tempfile()?;
        tokio::fs::write(scratch.path(), &media.bytes).await?;
        let frames = self
            .ctx
            .frames
            .extract(scratch.path(), self.ctx.video.frame_interval)
            .await?;
        log::info!("video {}: {} sampled frame(s)", content_id, frames.len());

        let mut seen = HashSet::new();
        let mut readings = Vec::new();
        for (i, frame) in frames.iter().enumerate() {
            let answer = match vision
                .classify_image(frame, "image/jpeg", messages::FRAME_PROMPT)
                .await
            {
                Ok(a) => a,
                Err(e) => {
                    log::warn!("video {}: frame {} skipped: {}", content_id, i, e);
                    continue;
                }
            };
            let Some(reading) = parse_frame_answer(&answer) else {
                continue;
            };
            if seen.insert(reading.clone()) {
                let record = PlateRecord::now(reading.clone(), Some(source), MediaKind::Video);
                self.ctx.recorder.record(&record).await;
                readings.push(reading);
            }
        }
        Ok(readings)
    }
}

#[async_trait]
impl EventHandler for VideoHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let EventPayload::Video { content_id } = &event.payload else {
            return Err(HandlerError::UnexpectedEvent(event.kind_name().to_string()));
        };
        if let Err(e) = self.ctx.reply(event, messages::VIDEO_RECEIVED).await {
            log::warn!("video {}: acknowledgement not sent: {}", content_id, e);
        }
        let source = event
            .source_id
            .as_deref()
            .ok_or(HandlerError::MissingField("source id"))?;

        let (summary, outcome) = match self.scan(content_id, source).await {
            Ok(readings) => (
                messages::video_summary(&readings, self.ctx.video.max_listed),
                Ok(()),
            ),
            Err(e) => (format!("ประมวลผลวิดีโอผิดพลาด: {}", e), Err(e)),
        };
        self.ctx.messenger.push(source, &summary).await?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{FakeFrames, FakeMessenger, FakeVision, Fakes};
    use crate::llm::LlmError;
    use crate::storage::testing::MemorySink;

    fn video_event() -> Event {
        Event {
            reply_token: Some("r1".to_string()),
            source_id: Some("U1".to_string()),
            payload: EventPayload::Video {
                content_id: "v1".to_string(),
            },
        }
    }

    /// Frame bytes are the vision answer, or a failure for `b"boom"`.
    fn echo_vision() -> FakeVision {
        FakeVision::new(|frame| {
            if frame == b"boom" {
                Err(LlmError::MalformedResponse("no candidates".to_string()))
            } else {
                Ok(String::from_utf8_lossy(frame).into_owned())
            }
        })
    }

    fn fakes(frames: &[&str]) -> (Fakes, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let mut f = Fakes::new(FakeMessenger::with_media(b"mp4 bytes"));
        f.vision = Some(Arc::new(echo_vision()));
        f.frames = Arc::new(FakeFrames {
            frames: frames.iter().map(|s| s.as_bytes().to_vec()).collect(),
            ..Default::default()
        });
        f.sinks.push(sink.clone());
        (f, sink)
    }

    #[tokio::test]
    async fn acknowledges_then_pushes_unique_readings() {
        let (f, sink) = fakes(&["กข 1,ตาก", "ไม่พบ", "boom", "กข 1,ตาก", "กข 2,ตาก"]);
        VideoHandler::new(f.context()).handle(&video_event()).await.unwrap();

        assert_eq!(f.messenger.reply_texts(), vec![messages::VIDEO_RECEIVED]);
        let pushes = f.messenger.pushes.lock().unwrap().clone();
        assert_eq!(
            pushes,
            vec![(
                "U1".to_string(),
                "ผลประมวลผลวิดีโอ:\nกข 1 (จ. ตาก)\nกข 2 (จ. ตาก)".to_string()
            )]
        );
        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.media_kind == MediaKind::Video));
    }

    #[tokio::test]
    async fn scratch_file_exists_during_extraction_only() {
        let (f, _) = fakes(&[]);
        VideoHandler::new(f.context()).handle(&video_event()).await.unwrap();
        let (path, existed, every_nth) = f.frames.seen.lock().unwrap().clone().unwrap();
        assert!(existed);
        assert_eq!(every_nth, 60);
        assert_eq!(path.extension().unwrap(), "mp4");
        assert!(!path.exists());
        assert_eq!(f.messenger.push_texts(), vec!["ผลประมวลผลวิดีโอ:\nไม่พบป้ายทะเบียน"]);
    }

    #[tokio::test]
    async fn extraction_failure_pushes_error() {
        let (mut f, _) = fakes(&[]);
        f.frames = Arc::new(FakeFrames {
            fail: true,
            ..Default::default()
        });
        let err = VideoHandler::new(f.context())
            .handle(&video_event())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Media(_)));
        let pushes = f.messenger.push_texts();
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].starts_with("ประมวลผลวิดีโอผิดพลาด: "));
        let (path, _, _) = f.frames.seen.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_vision_model_pushes_error() {
        let (mut f, _) = fakes(&["กข 1,ตาก"]);
        f.vision = None;
        let err = VideoHandler::new(f.context())
            .handle(&video_event())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Unavailable("vision model")));
        assert_eq!(f.messenger.reply_texts(), vec![messages::VIDEO_RECEIVED]);
        assert_eq!(f.messenger.push_texts().len(), 1);
    }

    #[tokio::test]
    async fn no_source_means_no_push() {
        let (f, _) = fakes(&["กข 1,ตาก"]);
        let mut event = video_event();
        event.source_id = None;
        let err = VideoHandler::new(f.context()).handle(&event).await.unwrap_err();
        assert!(matches!(err, HandlerError::MissingField("source id")));
        assert!(f.messenger.push_texts().is_empty());
    }
}
