//! Text messages: the report and reset commands, otherwise chat with per-source history.

use super::messages;
use super::{HandlerContext, HandlerError};
use crate::gateway::{Event, EventHandler, EventPayload};
use crate::storage::PlateRecord;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Report,
    Reset,
}

fn parse_command(text: &str) -> Option<Command> {
    let t = text.trim().to_lowercase();
    match t.as_str() {
        "report" | "รายงาน" => Some(Command::Report),
        "/new" | "เริ่มใหม่" => Some(Command::Reset),
        _ => None,
    }
}

fn report_line(index: usize, record: &PlateRecord) -> String {
    format!(
        "{}. {} {}",
        index + 1,
        record.local_time().format("%Y-%m-%d %H:%M"),
        record.reading.label()
    )
}

pub struct TextHandler {
    ctx: Arc<HandlerContext>,
}

impl TextHandler {
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        Self { ctx }
    }

    async fn report(&self) -> (String, Result<(), HandlerError>) {
        match self.ctx.recorder.recent(self.ctx.report_limit).await {
            Ok(None) => (messages::REPORT_NO_STORE.to_string(), Ok(())),
            Ok(Some(records)) if records.is_empty() => {
                (messages::REPORT_EMPTY.to_string(), Ok(()))
            }
            Ok(Some(records)) => {
                let mut out = messages::REPORT_HEADER.to_string();
                for (i, r) in records.iter().enumerate() {
                    out.push('\n');
                    out.push_str(&report_line(i, r));
                }
                (out, Ok(()))
            }
            Err(e) => (messages::REPORT_FAILED.to_string(), Err(e.into())),
        }
    }

    async fn reset(&self, event: &Event) -> String {
        if let Some(id) = event.source_id.as_deref() {
            if self.ctx.sessions.clear(id).await {
                log::info!("text: cleared chat session for {}", id);
            }
        }
        messages::SESSION_RESET.to_string()
    }

    async fn chat(&self, event: &Event, text: &str) -> (String, Result<(), HandlerError>) {
        let Some(chat) = self.ctx.chat.as_ref() else {
            return (
                messages::CHAT_NOT_READY.to_string(),
                Err(HandlerError::Unavailable("chat model")),
            );
        };
        let source = event.source_id.as_deref();
        let history = match source {
            Some(id) => self.ctx.sessions.history(id).await,
            None => Vec::new(),
        };
        match chat.converse(&history, text).await {
            Ok(answer) => {
                if let Some(id) = source {
                    self.ctx.sessions.append_exchange(id, text, answer.as_str()).await;
                }
                (answer, Ok(()))
            }
            Err(e) => (messages::chat_failed(&e), Err(e.into())),
        }
    }
}

#[async_trait]
impl EventHandler for TextHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let EventPayload::Text { text } = &event.payload else {
            return Err(HandlerError::UnexpectedEvent(event.kind_name().to_string()));
        };
        let text = text.trim();
        let (reply, outcome) = match parse_command(text) {
            Some(Command::Report) => self.report().await,
            Some(Command::Reset) => (self.reset(event).await, Ok(())),
            None => self.chat(event, text).await,
        };
        self.ctx.reply(event, &reply).await?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{FakeChat, FakeMessenger, Fakes};
    use crate::plate::PlateReading;
    use crate::storage::testing::MemorySink;
    use crate::storage::MediaKind;
    use chrono::{TimeZone, Utc};

    fn text_event(source: &str, text: &str) -> Event {
        Event {
            reply_token: Some("r1".to_string()),
            source_id: Some(source.to_string()),
            payload: EventPayload::Text {
                text: text.to_string(),
            },
        }
    }

    fn with_chat(fail: bool) -> Fakes {
        let mut fakes = Fakes::new(FakeMessenger::default());
        fakes.chat = Some(Arc::new(FakeChat {
            fail,
            ..Default::default()
        }));
        fakes
    }

    #[test]
    fn commands_are_trimmed_and_case_insensitive() {
        assert_eq!(parse_command("  REPORT "), Some(Command::Report));
        assert_eq!(parse_command("รายงาน"), Some(Command::Report));
        assert_eq!(parse_command("/new"), Some(Command::Reset));
        assert_eq!(parse_command("เริ่มใหม่"), Some(Command::Reset));
        assert_eq!(parse_command("report please"), None);
    }

    #[tokio::test]
    async fn chat_uses_per_source_history() {
        let fakes = with_chat(false);
        let h = TextHandler::new(fakes.context());
        h.handle(&text_event("U1", "hello")).await.unwrap();
        h.handle(&text_event("U1", "again")).await.unwrap();
        h.handle(&text_event("U2", "first")).await.unwrap();
        let chat = fakes.chat.as_ref().unwrap();
        let calls = chat.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                (0, "hello".to_string()),
                (2, "again".to_string()),
                (0, "first".to_string())
            ]
        );
        assert_eq!(fakes.messenger.reply_texts()[0], "echo: hello");
    }

    #[tokio::test]
    async fn chat_failure_apologizes_and_errors() {
        let fakes = with_chat(true);
        let ctx = fakes.context();
        let h = TextHandler::new(ctx.clone());
        let err = h.handle(&text_event("U1", "hi")).await.unwrap_err();
        assert!(matches!(err, HandlerError::Llm(_)));
        assert_eq!(fakes.messenger.reply_texts(), vec!["ขออภัย สมองผมมีปัญหา: บริการ AI ขัดข้อง"]);
        assert!(ctx.sessions.history("U1").await.is_empty());
    }

    #[tokio::test]
    async fn missing_chat_model_still_replies() {
        let fakes = Fakes::new(FakeMessenger::default());
        let h = TextHandler::new(fakes.context());
        let err = h.handle(&text_event("U1", "hi")).await.unwrap_err();
        assert!(matches!(err, HandlerError::Unavailable("chat model")));
        assert_eq!(fakes.messenger.reply_texts(), vec![messages::CHAT_NOT_READY]);
    }

    #[tokio::test]
    async fn reset_clears_session() {
        let fakes = with_chat(false);
        let ctx = fakes.context();
        let h = TextHandler::new(ctx.clone());
        h.handle(&text_event("U1", "hello")).await.unwrap();
        h.handle(&text_event("U1", "/new")).await.unwrap();
        assert!(ctx.sessions.get("U1").await.is_none());
        assert_eq!(fakes.messenger.reply_texts()[1], messages::SESSION_RESET);
    }

    #[tokio::test]
    async fn report_without_history_store() {
        let fakes = with_chat(false);
        let h = TextHandler::new(fakes.context());
        h.handle(&text_event("U1", "report")).await.unwrap();
        assert_eq!(fakes.messenger.reply_texts(), vec![messages::REPORT_NO_STORE]);
        assert!(fakes.chat.as_ref().unwrap().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn report_lists_newest_first_in_thai_time() {
        let sink = Arc::new(MemorySink::default());
        for (plate, hour) in [("กข 1", 1), ("กข 2", 2)] {
            sink.records.lock().unwrap().push(PlateRecord {
                reading: PlateReading {
                    plate_number: plate.to_string(),
                    province: "ตาก".to_string(),
                },
                source_id: None,
                media_kind: MediaKind::Image,
                recorded_at: Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap(),
            });
        }
        let mut fakes = Fakes::new(FakeMessenger::default());
        fakes.sinks.push(sink);
        let h = TextHandler::new(fakes.context());
        h.handle(&text_event("U1", "รายงาน")).await.unwrap();
        assert_eq!(
            fakes.messenger.reply_texts(),
            vec![
                "ป้ายทะเบียนล่าสุด:\n\
                 1. 2026-03-01 09:00 กข 2 (จ. ตาก)\n\
                 2. 2026-03-01 08:00 กข 1 (จ. ตาก)"
            ]
        );
    }
}
