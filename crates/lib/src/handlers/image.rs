//! Image messages: read the plate, record it, and explain the plate type.

use super::messages;
use super::{HandlerContext, HandlerError};
use crate::gateway::{Event, EventHandler, EventPayload};
use crate::plate::{parse_labeled_reading, PlateReading};
use crate::storage::{MediaKind, PlateRecord};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ImageHandler {
    ctx: Arc<HandlerContext>,
}

impl ImageHandler {
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        Self { ctx }
    }

    /// OCR answer, plus the explanation section when a plate was read.
    async fn read_plate(&self, event: &Event, content_id: &str) -> Result<String, HandlerError> {
        let vision = self.ctx.vision()?;
        let media = self.ctx.messenger.fetch_media(content_id).await?;
        let answer = vision
            .classify_image(&media.bytes, media.mime_or("image/jpeg"), messages::OCR_PROMPT)
            .await?;

        let Some(reading) = parse_labeled_reading(&answer) else {
            log::debug!("image: no legible plate in {}", content_id);
            return Ok(answer);
        };
        let record = PlateRecord::now(
            reading.clone(),
            event.source_id.as_deref(),
            MediaKind::Image,
        );
        self.ctx.recorder.record(&record).await;

        let explanation = self.explain(&reading).await;
        Ok(format!("{}\n\n{}", answer, explanation))
    }

    async fn explain(&self, reading: &PlateReading) -> String {
        let Some(chat) = self.ctx.chat.as_ref() else {
            return messages::EXPLANATION_UNAVAILABLE.to_string();
        };
        match chat.converse(&[], &messages::explain_prompt(reading)).await {
            Ok(text) => format!("{}\n{}", messages::EXPLANATION_HEADER, text),
            Err(e) => {
                log::warn!("image: explanation for {} failed: {}", reading.label(), e);
                messages::EXPLANATION_FAILED.to_string()
            }
        }
    }
}

fn failure_reply(e: &HandlerError) -> String {
    let reason = match e {
        HandlerError::Llm(e) => messages::describe_llm_error(e).to_string(),
        HandlerError::Messaging(_) => "ดาวน์โหลดรูปภาพไม่สำเร็จ".to_string(),
        HandlerError::Unavailable(what) => format!("{} ยังไม่พร้อม", what),
        other => other.to_string(),
    };
    format!("เกิดข้อผิดพลาดในการอ่านภาพ: {}", reason)
}

#[async_trait]
impl EventHandler for ImageHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let EventPayload::Image { content_id } = &event.payload else {
            return Err(HandlerError::UnexpectedEvent(event.kind_name().to_string()));
        };
        let (reply, outcome) = match self.read_plate(event, content_id).await {
            Ok(text) => (text, Ok(())),
            Err(e) => (failure_reply(&e), Err(e)),
        };
        self.ctx.reply(event, &reply).await?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{FakeChat, FakeMessenger, FakeVision, Fakes};
    use crate::llm::LlmError;
    use crate::storage::testing::MemorySink;
    use std::time::Duration;

    const READ: &str = "เลขทะเบียน: กข 1234\nจังหวัด: กรุงเทพมหานคร";

    fn image_event() -> Event {
        Event {
            reply_token: Some("r1".to_string()),
            source_id: Some("U1".to_string()),
            payload: EventPayload::Image {
                content_id: "m1".to_string(),
            },
        }
    }

    fn fakes(answer: &str, sink: Arc<MemorySink>) -> Fakes {
        let mut f = Fakes::new(FakeMessenger::with_media(b"jpeg"));
        f.vision = Some(Arc::new(FakeVision::fixed(answer)));
        f.chat = Some(Arc::new(FakeChat::default()));
        f.sinks.push(sink);
        f
    }

    #[tokio::test]
    async fn legible_plate_is_recorded_and_explained() {
        let sink = Arc::new(MemorySink::default());
        let f = fakes(READ, sink.clone());
        ImageHandler::new(f.context()).handle(&image_event()).await.unwrap();

        let replies = f.messenger.reply_texts();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with(READ));
        assert!(replies[0].contains("\n\n--- ข้อมูลป้าย ---\necho: "));

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reading.plate_number, "กข 1234");
        assert_eq!(records[0].source_id.as_deref(), Some("U1"));
        assert_eq!(records[0].media_kind, MediaKind::Image);
    }

    #[tokio::test]
    async fn persistence_failure_leaves_reply_unchanged() {
        let ok = fakes(READ, Arc::new(MemorySink::default()));
        ImageHandler::new(ok.context()).handle(&image_event()).await.unwrap();

        let failing = fakes(
            READ,
            Arc::new(MemorySink {
                fail: true,
                ..Default::default()
            }),
        );
        ImageHandler::new(failing.context())
            .handle(&image_event())
            .await
            .unwrap();

        assert_eq!(ok.messenger.reply_texts(), failing.messenger.reply_texts());
    }

    #[tokio::test]
    async fn unclear_plate_is_not_recorded() {
        let sink = Arc::new(MemorySink::default());
        let f = fakes("เลขทะเบียน: ไม่ชัดเจน\nจังหวัด: ไม่ชัดเจน", sink.clone());
        ImageHandler::new(f.context()).handle(&image_event()).await.unwrap();
        assert!(sink.records.lock().unwrap().is_empty());
        assert_eq!(
            f.messenger.reply_texts(),
            vec!["เลขทะเบียน: ไม่ชัดเจน\nจังหวัด: ไม่ชัดเจน"]
        );
        assert!(f.chat.as_ref().unwrap().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn explanation_failure_adds_note() {
        let sink = Arc::new(MemorySink::default());
        let mut f = fakes(READ, sink);
        f.chat = Some(Arc::new(FakeChat {
            fail: true,
            ..Default::default()
        }));
        ImageHandler::new(f.context()).handle(&image_event()).await.unwrap();
        assert_eq!(
            f.messenger.reply_texts(),
            vec![format!("{}\n\n{}", READ, messages::EXPLANATION_FAILED)]
        );
    }

    #[tokio::test]
    async fn vision_timeout_replies_once_and_errors() {
        let mut f = Fakes::new(FakeMessenger::with_media(b"jpeg"));
        f.vision = Some(Arc::new(FakeVision::new(|_| {
            Err(LlmError::DeadlineExceeded(Duration::from_secs(30)))
        })));
        let err = ImageHandler::new(f.context())
            .handle(&image_event())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Llm(LlmError::DeadlineExceeded(_))));
        let replies = f.messenger.reply_texts();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("หมดเวลา"));
    }

    #[tokio::test]
    async fn media_fetch_failure_replies_once() {
        let mut f = Fakes::new(FakeMessenger {
            fail_fetch: true,
            ..Default::default()
        });
        f.vision = Some(Arc::new(FakeVision::fixed(READ)));
        let err = ImageHandler::new(f.context())
            .handle(&image_event())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Messaging(_)));
        assert_eq!(f.messenger.reply_texts().len(), 1);
        assert!(f.vision.as_ref().unwrap().calls.lock().unwrap().is_empty());
    }
}
