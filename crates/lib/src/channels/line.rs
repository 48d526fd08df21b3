//! LINE Messaging API client: reply, push, and message content download.

use crate::channels::messenger::{MediaContent, Messenger, MessagingError};
use async_trait::async_trait;
use serde::Serialize;

const LINE_API_BASE: &str = "https://api.line.me";
const LINE_DATA_API_BASE: &str = "https://api-data.line.me";

/// Maximum characters in one LINE text message.
pub const LINE_TEXT_LIMIT: usize = 5000;

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    typ: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

/// Client for one LINE channel (bearer channel access token).
#[derive(Clone)]
pub struct LineClient {
    access_token: String,
    api_base: String,
    data_api_base: String,
    client: reqwest::Client,
}

impl LineClient {
    pub fn new(
        access_token: impl Into<String>,
        api_base: Option<String>,
        data_api_base: Option<String>,
    ) -> Self {
        let trim = |u: String| u.trim_end_matches('/').to_string();
        Self {
            access_token: access_token.into(),
            api_base: api_base
                .map(trim)
                .unwrap_or_else(|| LINE_API_BASE.to_string()),
            data_api_base: data_api_base
                .map(trim)
                .unwrap_or_else(|| LINE_DATA_API_BASE.to_string()),
            client: reqwest::Client::new(),
        }
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        what: &str,
    ) -> Result<(), MessagingError> {
        let url = format!("{}{}", self.api_base, path);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MessagingError::Api(format!("{} failed: {} {}", what, status, body)));
        }
        Ok(())
    }
}

/// Cut `text` to the platform limit on a char boundary.
pub(crate) fn clamp_text(text: &str) -> &str {
    match text.char_indices().nth(LINE_TEXT_LIMIT) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[async_trait]
impl Messenger for LineClient {
    /// GET {data_api}/v2/bot/message/{id}/content
    async fn fetch_media(&self, content_id: &str) -> Result<MediaContent, MessagingError> {
        let url = format!(
            "{}/v2/bot/message/{}/content",
            self.data_api_base, content_id
        );
        let res = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MessagingError::Api(format!(
                "content {} failed: {} {}",
                content_id, status, body
            )));
        }
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = res.bytes().await?.to_vec();
        Ok(MediaContent {
            bytes,
            content_type,
        })
    }

    /// POST {api}/v2/bot/message/reply
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), MessagingError> {
        let body = ReplyRequest {
            reply_token,
            messages: [TextMessage {
                typ: "text",
                text: clamp_text(text),
            }],
        };
        self.post_json("/v2/bot/message/reply", &body, "reply").await
    }

    /// POST {api}/v2/bot/message/push
    async fn push(&self, to: &str, text: &str) -> Result<(), MessagingError> {
        let body = PushRequest {
            to,
            messages: [TextMessage {
                typ: "text",
                text: clamp_text(text),
            }],
        };
        self.post_json("/v2/bot/message/push", &body, "push").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_body_matches_platform_schema() {
        let body = ReplyRequest {
            reply_token: "tok",
            messages: [TextMessage {
                typ: "text",
                text: "hi",
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"replyToken":"tok","messages":[{"type":"text","text":"hi"}]})
        );
    }

    #[test]
    fn long_text_is_clamped_on_char_boundary() {
        let text = "ก".repeat(LINE_TEXT_LIMIT + 10);
        let clamped = clamp_text(&text);
        assert_eq!(clamped.chars().count(), LINE_TEXT_LIMIT);
        assert_eq!(clamp_text("short"), "short");
    }

    #[test]
    fn base_urls_drop_trailing_slash() {
        let c = LineClient::new("t", Some("http://127.0.0.1:9/".to_string()), None);
        assert_eq!(c.api_base, "http://127.0.0.1:9");
        assert_eq!(c.data_api_base, LINE_DATA_API_BASE);
    }
}
