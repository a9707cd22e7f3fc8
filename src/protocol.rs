//! Wire types shared with the automation backend.
//!
//! The backend exposes three surfaces:
//!
//! - `POST /chat`: one request per user message ([`ChatRequest`] → [`ChatResponse`])
//! - `GET /status`: a snapshot of the current automation run ([`AutomationSnapshot`])
//! - `GET /events`: a Server-Sent Events stream of [`PushEvent`]s
//!
//! Payload fields the console only displays are not validated: missing or
//! `null` values fall back to defaults, and scalars of the wrong type are shown
//! as text, so they surface as rendering artifacts rather than errors.
//!
//! # Example
//!
//! ```rust
//! use automation_chat_console::protocol::PushEvent;
//!
//! let event = PushEvent::decode("status_update", r#"{"progress": 42, "step": "Logging in"}"#)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(event.event_name(), "status_update");
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use crate::error::{ConsoleError, Result};

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// Trimmed user message.
    pub message: String,
    /// Correlation token for the page session.
    pub session_id: String,
}

/// Reply to `POST /chat`.
///
/// The backend sends more fields (`needs_input`, `context`); they are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    /// Declared reply category, e.g. `gmail_request`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Text shown in the chat log.
    pub response: String,
}

/// Snapshot served by `GET /status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AutomationSnapshot {
    /// Whether an automation run is in progress.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub running: bool,
    /// Label of the step last reported.
    #[serde(default, deserialize_with = "lenient_text")]
    pub current_step: String,
    /// Last reported progress percentage.
    #[serde(default, deserialize_with = "lenient_number")]
    pub progress: f64,
    /// Error text of the last failed run, if any.
    #[serde(default, deserialize_with = "lenient_label")]
    pub error: Option<String>,
}

/// Generated email shown in the preview panel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailContent {
    #[serde(default, deserialize_with = "lenient_text")]
    pub subject: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub body: String,
}

/// Payload of `connected`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connected {
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: String,
}

/// Payload of `status_update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdate {
    /// Progress percentage.
    #[serde(default, deserialize_with = "lenient_number")]
    pub progress: f64,
    /// Human-readable step label.
    #[serde(default, deserialize_with = "lenient_text")]
    pub step: String,
    /// Screenshot image source (usually a `data:` URL).
    #[serde(default, deserialize_with = "lenient_label", skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, deserialize_with = "lenient_label", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Page the automated browser is on.
    #[serde(default, deserialize_with = "lenient_label", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Payload of `automation_complete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutomationComplete {
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_content: Option<EmailContent>,
}

/// Payload of `automation_error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutomationError {
    #[serde(default, deserialize_with = "lenient_text")]
    pub error: String,
}

/// Payload of `chat_message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessagePush {
    /// Message category; `system` when absent.
    #[serde(rename = "type", default, deserialize_with = "lenient_label", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_label", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Payload of `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPush {
    #[serde(default, deserialize_with = "lenient_label", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Display text from any JSON scalar; `null` and containers become empty.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    })
}

/// Like [`lenient_text`], with `null` and containers read as absent.
fn lenient_label<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

fn lenient_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

/// Number or numeric string; anything else reads as zero.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(text) => text.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

/// Asynchronous notification pushed by the backend.
///
/// Serialized as an envelope `{"event": <name>, "data": <payload>}`, which is
/// also the format accepted on unnamed SSE frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    /// Server greeting after the channel opens.
    Connected(Connected),
    /// Progress tick, optionally with a fresh screenshot.
    StatusUpdate(StatusUpdate),
    /// Terminal success of an automation run.
    AutomationComplete(AutomationComplete),
    /// Terminal failure of an automation run.
    AutomationError(AutomationError),
    /// Chat entry originated by the backend.
    ChatMessage(ChatMessagePush),
    /// Channel-level error notification.
    Error(ErrorPush),
}

/// Every event name the console understands.
pub const EVENT_NAMES: &[&str] = &[
    "connected",
    "status_update",
    "automation_complete",
    "automation_error",
    "chat_message",
    "error",
];

/// SSE event name used when a frame carries no `event:` line.
pub const DEFAULT_SSE_EVENT: &str = "message";

#[derive(Deserialize)]
struct PushEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl PushEvent {
    /// Decode one SSE frame.
    ///
    /// Returns `Ok(None)` for event names the console does not handle and
    /// [`ConsoleError::MalformedPush`] when a known event carries an
    /// undecodable payload.
    pub fn decode(event: &str, data: &str) -> Result<Option<Self>> {
        let malformed = |source| ConsoleError::MalformedPush {
            event: event.to_string(),
            source,
        };

        if event == DEFAULT_SSE_EVENT {
            let envelope: PushEnvelope = serde_json::from_str(data).map_err(malformed)?;
            return Self::from_parts(&envelope.event, envelope.data);
        }

        let payload = if data.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(data).map_err(malformed)?
        };
        Self::from_parts(event, payload)
    }

    fn from_parts(event: &str, payload: Value) -> Result<Option<Self>> {
        if !EVENT_NAMES.contains(&event) {
            return Ok(None);
        }
        let payload = if payload.is_null() { json!({}) } else { payload };
        serde_json::from_value(json!({ "event": event, "data": payload }))
            .map(Some)
            .map_err(|source| ConsoleError::MalformedPush {
                event: event.to_string(),
                source,
            })
    }

    /// SSE event name for this event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::StatusUpdate(_) => "status_update",
            Self::AutomationComplete(_) => "automation_complete",
            Self::AutomationError(_) => "automation_error",
            Self::ChatMessage(_) => "chat_message",
            Self::Error(_) => "error",
        }
    }

    /// Format this event as a named SSE frame.
    pub fn to_sse_frame(&self) -> String {
        let payload = serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("data").map(Value::take))
            .unwrap_or_else(|| json!({}));
        format!("event: {}\ndata: {payload}\n\n", self.event_name())
    }
}
