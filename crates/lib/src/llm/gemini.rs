//! Gemini API client (generateContent), used for both image reading and chat.

use crate::llm::{ChatModel, ChatRole, ChatTurn, LlmError, VisionModel};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";

/// Client for one Gemini model. Clone to share; the HTTP pool is shared.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    system_instruction: Option<String>,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("gemini: falling back to default http client: {}", e);
                reqwest::Client::new()
            });
        Self {
            base_url,
            model: model.into(),
            api_key: api_key.into(),
            timeout,
            system_instruction: None,
            client,
        }
    }

    /// Same model and connection pool, with a system instruction sent on every request.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        let s = instruction.into();
        self.system_instruction = if s.trim().is_empty() { None } else { Some(s) };
        self
    }

    /// POST /v1beta/models/{model}:generateContent
    async fn generate(&self, contents: Vec<Content>) -> Result<String, LlmError> {
        let url = format!(
            "{}/{}/models/{}:generateContent",
            self.base_url, API_VERSION, self.model
        );
        let body = GenerateRequest {
            contents,
            system_instruction: self.system_instruction.as_ref().map(|s| Content {
                role: None,
                parts: vec![Part::text(s)],
            }),
        };
        let call = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send();
        let res = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LlmError::DeadlineExceeded(self.timeout))?
            .map_err(|e| self.request_error(e))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Service(format!("{} {}", status, body)));
        }
        let data: GenerateResponse = res.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::DeadlineExceeded(self.timeout)
            } else {
                LlmError::MalformedResponse(e.to_string())
            }
        })?;
        data.text()
    }

    fn request_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::DeadlineExceeded(self.timeout)
        } else {
            // Drop the URL: it carries the API key.
            LlmError::Service(e.without_url().to_string())
        }
    }
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn classify_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let data = base64::engine::general_purpose::STANDARD.encode(image);
        let contents = vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::text(prompt),
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: mime_type.to_string(),
                        data,
                    }),
                },
            ],
        }];
        self.generate(contents).await
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn converse(&self, history: &[ChatTurn], text: &str) -> Result<String, LlmError> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|t| Content {
                role: Some(role_name(t.role).to_string()),
                parts: vec![Part::text(&t.text)],
            })
            .collect();
        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        });
        self.generate(contents).await
    }
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Model => "model",
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(s: &str) -> Self {
        Self {
            text: Some(s.to_string()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Result<String, LlmError> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(LlmError::Service(format!("prompt blocked: {}", reason)));
        }
        let candidate = self
            .candidates
            .first()
            .ok_or_else(|| LlmError::MalformedResponse("no candidates".to_string()))?;
        let text: String = candidate
            .content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::MalformedResponse(format!(
                "candidate has no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}
