//! Webhook envelope parsing: raw body -> ordered, typed events.
//!
//! Accepts the LINE shape (`type: "message"` with a nested `message`) and a flat shape
//! with an explicit `kind` field. A present `kind` wins.

use super::GatewayError;
use serde::Deserialize;
use serde_json::Value;

/// Routing discriminant of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Text,
    Image,
    Video,
    Unknown,
}

/// Variant-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Text { text: String },
    /// Image message; `content_id` fetches the binary via the content API.
    Image { content_id: String },
    /// Video message; `content_id` fetches the binary via the content API.
    Video { content_id: String },
    /// Any kind without a typed variant (stickers, follow, postback, ...).
    Unknown { kind: String, raw: Value },
}

/// One unit of user activity from a delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Single-use token for one synchronous reply. Absent for some platform events.
    pub reply_token: Option<String>,
    /// User, group or room id used for push messages and session lookup.
    pub source_id: Option<String>,
    pub payload: EventPayload,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Text { .. } => EventKind::Text,
            EventPayload::Image { .. } => EventKind::Image,
            EventPayload::Video { .. } => EventKind::Video,
            EventPayload::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// Declared kind as received (e.g. "sticker" for unknown events).
    pub fn kind_name(&self) -> &str {
        match &self.payload {
            EventPayload::Text { .. } => "text",
            EventPayload::Image { .. } => "image",
            EventPayload::Video { .. } => "video",
            EventPayload::Unknown { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    events: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(default)]
    kind: Option<String>,
    #[serde(rename = "type", default)]
    typ: Option<String>,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<RawSource>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Parse the whole envelope before anything is dispatched. Any malformed element rejects
/// the delivery. A body without `events` is an empty delivery (the platform's verify call).
pub fn parse_envelope(raw_body: &[u8]) -> Result<Vec<Event>, GatewayError> {
    let body: Value = serde_json::from_slice(raw_body)
        .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
    if !body.is_object() {
        return Err(GatewayError::MalformedPayload(format!(
            "envelope must be a JSON object, got {}",
            json_type(&body)
        )));
    }
    let envelope = RawEnvelope::deserialize(&body)
        .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
    envelope
        .events
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            parse_event(value)
                .map_err(|e| GatewayError::MalformedPayload(format!("events[{}]: {}", i, e)))
        })
        .collect()
}

/// JSON type name for error messages.
fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_event(value: Value) -> Result<Event, String> {
    // serde's struct derive would also accept a JSON array here
    if !value.is_object() {
        return Err(format!("event must be a JSON object, got {}", json_type(&value)));
    }
    if let Some(message) = value.get("message").filter(|m| !m.is_null() && !m.is_object()) {
        return Err(format!("message must be a JSON object, got {}", json_type(message)));
    }
    let raw = RawEvent::deserialize(&value).map_err(|e| e.to_string())?;
    let kind = match (&raw.kind, &raw.typ) {
        (Some(k), _) => k.clone(),
        (None, Some(t)) if t == "message" => raw
            .message
            .as_ref()
            .map(|m| m.typ.clone())
            .ok_or("message event without message")?,
        (None, Some(t)) => t.clone(),
        (None, None) => return Err("event has neither kind nor type".to_string()),
    };

    let text = raw
        .text
        .clone()
        .or_else(|| raw.message.as_ref().and_then(|m| m.text.clone()));
    let id = raw
        .id
        .clone()
        .or_else(|| raw.message.as_ref().and_then(|m| m.id.clone()));

    let payload = match kind.as_str() {
        "text" => EventPayload::Text {
            text: text.ok_or("text event without text")?,
        },
        "image" => EventPayload::Image {
            content_id: id.ok_or("image event without id")?,
        },
        "video" => EventPayload::Video {
            content_id: id.ok_or("video event without id")?,
        },
        _ => EventPayload::Unknown { kind, raw: value },
    };

    let source_id = raw
        .source
        .and_then(|s| s.user_id.or(s.group_id).or(s.room_id));

    Ok(Event {
        reply_token: raw.reply_token,
        source_id,
        payload,
    })
}
