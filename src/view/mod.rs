//! View model for the console page.
//!
//! [`UiState`] holds the current value of every display region. Each mutation
//! primitive overwrites one or more regions wholesale and returns the
//! [`ViewPatch`]es a connected browser needs to catch up; the controller
//! decides when to call them and publishes the patches.
//!
//! # Regions
//!
//! | Region | DOM id |
//! |---|---|
//! | chat log | `chatContainer` |
//! | input bar | `inputBar` |
//! | connection status | `connectionStatus` |
//! | agent status | `agentStatus` |
//! | automation status | `automationStatus` |
//! | progress section | `progressSection` |
//! | screenshot pane | `screenshotContainer` |
//! | screenshot info | `screenshotInfo` |
//! | email preview | `emailPreviewSection` |

pub mod render;

use serde::Serialize;

use crate::format;
use crate::protocol::EmailContent;

pub use render::Swap;

/// Automation label that hides the progress panel.
pub const AUTOMATION_IDLE: &str = "Idle";
pub const AUTOMATION_RUNNING: &str = "Running...";
pub const AUTOMATION_INITIALIZING: &str = "Initializing...";
pub const AUTOMATION_COMPLETED: &str = "Completed Successfully";
pub const AUTOMATION_FAILED: &str = "Error Occurred";

/// Shown in place of a screenshot URL the backend did not send.
pub const URL_FALLBACK: &str = "Loading...";

/// Visual category of a chat entry.
///
/// Reply and push kinds are free-form strings chosen by the backend; the ones
/// the console styles itself get their own variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum MessageKind {
    User,
    System,
    Success,
    Error,
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Success => "success",
            Self::Error => "error",
            Self::Other(kind) => kind,
        }
    }

    pub fn avatar(&self) -> &'static str {
        format::avatar_for(self.as_str())
    }
}

impl From<&str> for MessageKind {
    fn from(kind: &str) -> Self {
        match kind {
            "user" => Self::User,
            "system" => Self::System,
            "success" => Self::Success,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One rendered line of the chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    pub kind: MessageKind,
    pub text: String,
    pub timestamp: String,
}

impl ChatEntry {
    /// Create an entry, stamping it with the local time when no timestamp is given.
    pub fn new(kind: impl Into<MessageKind>, text: impl Into<String>, timestamp: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
            timestamp: timestamp.unwrap_or_else(format::local_time_label),
        }
    }
}

/// Input field and send button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputState {
    pub enabled: bool,
    pub placeholder: String,
}

impl InputState {
    pub const READY_PLACEHOLDER: &'static str = "Type your message...";
    pub const BUSY_PLACEHOLDER: &'static str = "AI is thinking...";

    fn enabled() -> Self {
        Self {
            enabled: true,
            placeholder: Self::READY_PLACEHOLDER.to_string(),
        }
    }

    fn busy() -> Self {
        Self {
            enabled: false,
            placeholder: Self::BUSY_PLACEHOLDER.to_string(),
        }
    }
}

/// Lifecycle of the push channel as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Initial attempt not settled yet.
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Free-text status with a running flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLabel {
    pub text: String,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressPanel {
    pub visible: bool,
    pub percent: f64,
    pub step: String,
}

/// Last screenshot shown in the pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenshotFrame {
    /// Image source, usually a `data:` URL.
    pub image: String,
    pub step: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenshotInfo {
    pub current_url: String,
    pub last_update: String,
}

/// Every display region of the page plus the in-flight flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiState {
    pub session_id: String,
    pub chat: Vec<ChatEntry>,
    pub input: InputState,
    pub connection: ConnectionState,
    pub agent_status: StatusLabel,
    pub automation_status: StatusLabel,
    pub progress: ProgressPanel,
    pub screenshot: Option<ScreenshotFrame>,
    pub screenshot_info: ScreenshotInfo,
    pub email_preview: Option<EmailContent>,
    /// Set while a chat request is in flight.
    pub waiting_for_response: bool,
}

/// Page region addressed by a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    ChatLog,
    InputBar,
    ConnectionStatus,
    AgentStatus,
    AutomationStatus,
    ProgressSection,
    ScreenshotPane,
    ScreenshotInfo,
    EmailPreview,
}

impl Region {
    pub fn dom_id(self) -> &'static str {
        match self {
            Self::ChatLog => "chatContainer",
            Self::InputBar => "inputBar",
            Self::ConnectionStatus => "connectionStatus",
            Self::AgentStatus => "agentStatus",
            Self::AutomationStatus => "automationStatus",
            Self::ProgressSection => "progressSection",
            Self::ScreenshotPane => "screenshotContainer",
            Self::ScreenshotInfo => "screenshotInfo",
            Self::EmailPreview => "emailPreviewSection",
        }
    }
}

/// Incremental page update, rendered as htmx out-of-band markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewPatch {
    /// Replace a whole region.
    Replace { region: Region, html: String },
    /// Append one entry to the chat log.
    AppendChat { html: String },
}

impl ViewPatch {
    fn replace(region: Region, state: &UiState) -> Self {
        Self::Replace {
            region,
            html: render::region(region, state, Swap::OutOfBand),
        }
    }

    /// Region this patch touches.
    pub fn region(&self) -> Region {
        match self {
            Self::Replace { region, .. } => *region,
            Self::AppendChat { .. } => Region::ChatLog,
        }
    }

    /// Markup to hand to htmx; every element carries its own `hx-swap-oob`.
    pub fn html(&self) -> &str {
        match self {
            Self::Replace { html, .. } | Self::AppendChat { html } => html,
        }
    }
}

impl UiState {
    /// Initial state for a freshly loaded page.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            chat: Vec::new(),
            input: InputState::enabled(),
            connection: ConnectionState::Connecting,
            agent_status: StatusLabel {
                text: format::DEFAULT_AGENT_LABEL.to_string(),
                running: false,
            },
            automation_status: StatusLabel {
                text: AUTOMATION_IDLE.to_string(),
                running: false,
            },
            progress: ProgressPanel {
                visible: false,
                percent: 0.0,
                step: String::new(),
            },
            screenshot: None,
            screenshot_info: ScreenshotInfo {
                current_url: "-".to_string(),
                last_update: "-".to_string(),
            },
            email_preview: None,
            waiting_for_response: false,
        }
    }

    pub fn push_chat(&mut self, entry: ChatEntry) -> ViewPatch {
        let html = render::appended_chat_entry(&entry);
        self.chat.push(entry);
        ViewPatch::AppendChat { html }
    }

    /// Drop every entry except `system` ones.
    pub fn clear_chat(&mut self) -> ViewPatch {
        self.chat.retain(|entry| entry.kind == MessageKind::System);
        ViewPatch::replace(Region::ChatLog, self)
    }

    pub fn set_input_enabled(&mut self, enabled: bool) -> ViewPatch {
        self.input = if enabled {
            InputState::enabled()
        } else {
            InputState::busy()
        };
        ViewPatch::replace(Region::InputBar, self)
    }

    pub fn set_connection(&mut self, connection: ConnectionState) -> ViewPatch {
        self.connection = connection;
        ViewPatch::replace(Region::ConnectionStatus, self)
    }

    pub fn set_agent_status(&mut self, text: &str) -> ViewPatch {
        self.agent_status = StatusLabel {
            text: text.to_string(),
            running: format::is_running_agent_label(text),
        };
        ViewPatch::replace(Region::AgentStatus, self)
    }

    /// Any value other than [`AUTOMATION_IDLE`] marks the automation running and
    /// reveals the progress panel; `Idle` hides it.
    pub fn set_automation_status(&mut self, text: &str) -> Vec<ViewPatch> {
        let running = text != AUTOMATION_IDLE;
        self.automation_status = StatusLabel {
            text: text.to_string(),
            running,
        };
        self.progress.visible = running;
        vec![
            ViewPatch::replace(Region::AutomationStatus, self),
            ViewPatch::replace(Region::ProgressSection, self),
        ]
    }

    pub fn update_progress(&mut self, percent: f64, step: &str) -> Vec<ViewPatch> {
        self.progress.percent = percent;
        self.progress.step = step.to_string();
        // Also re-renders the progress section with the new values.
        self.set_automation_status(AUTOMATION_RUNNING)
    }

    pub fn update_screenshot(&mut self, frame: ScreenshotFrame, url: Option<&str>) -> Vec<ViewPatch> {
        self.screenshot_info = ScreenshotInfo {
            current_url: url.unwrap_or(URL_FALLBACK).to_string(),
            last_update: frame.timestamp.clone(),
        };
        self.screenshot = Some(frame);
        vec![
            ViewPatch::replace(Region::ScreenshotPane, self),
            ViewPatch::replace(Region::ScreenshotInfo, self),
        ]
    }

    pub fn show_email_preview(&mut self, content: EmailContent) -> ViewPatch {
        self.email_preview = Some(content);
        ViewPatch::replace(Region::EmailPreview, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> UiState {
        UiState::new("session_test_1")
    }

    #[test]
    fn test_initial_state() {
        let state = state();
        assert!(state.input.enabled);
        assert_eq!(state.automation_status.text, AUTOMATION_IDLE);
        assert!(!state.progress.visible);
        assert_eq!(state.connection, ConnectionState::Connecting);
    }

    #[test]
    fn test_message_kind_roundtrip_names() {
        assert_eq!(MessageKind::from("user"), MessageKind::User);
        assert_eq!(
            MessageKind::from("gmail_request"),
            MessageKind::Other("gmail_request".to_string())
        );
        assert_eq!(MessageKind::from("gmail_request").avatar(), "📧");
        assert_eq!(MessageKind::from("general").avatar(), format::DEFAULT_AVATAR);
    }

    #[test]
    fn test_entry_timestamp_defaults_to_now() {
        let entry = ChatEntry::new("system", "hi", None);
        assert_eq!(entry.timestamp.len(), 8);
        let entry = ChatEntry::new("system", "hi", Some("10:00:00".to_string()));
        assert_eq!(entry.timestamp, "10:00:00");
    }

    #[test]
    fn test_automation_status_drives_progress_visibility() {
        let mut state = state();
        let patches = state.set_automation_status("Initializing...");
        assert!(state.automation_status.running);
        assert!(state.progress.visible);
        assert_eq!(patches.len(), 2);

        state.set_automation_status(AUTOMATION_IDLE);
        assert!(!state.automation_status.running);
        assert!(!state.progress.visible);
    }

    #[test]
    fn test_agent_status_running_flag() {
        let mut state = state();
        state.set_agent_status("Starting automation...");
        assert!(state.agent_status.running);
        state.set_agent_status("Waiting for password");
        assert!(!state.agent_status.running);
    }

    #[test]
    fn test_progress_marks_running() {
        let mut state = state();
        state.update_progress(42.0, "Logging in");
        assert_eq!(state.automation_status.text, AUTOMATION_RUNNING);
        assert!(state.progress.visible);
        assert_eq!(state.progress.step, "Logging in");
    }

    #[test]
    fn test_screenshot_url_fallback() {
        let mut state = state();
        let frame = ScreenshotFrame {
            image: "data:image/png;base64,AAAA".to_string(),
            step: "Compose opened".to_string(),
            timestamp: "12:00:01".to_string(),
        };
        state.update_screenshot(frame, None);
        assert_eq!(state.screenshot_info.current_url, URL_FALLBACK);
        assert_eq!(state.screenshot_info.last_update, "12:00:01");
    }

    #[test]
    fn test_clear_chat_keeps_system_entries() {
        let mut state = state();
        state.push_chat(ChatEntry::new("system", "welcome", None));
        state.push_chat(ChatEntry::new("user", "hello", None));
        state.push_chat(ChatEntry::new("error", "oops", None));
        let patch = state.clear_chat();
        assert_eq!(state.chat.len(), 1);
        assert_eq!(state.chat[0].kind, MessageKind::System);
        assert_eq!(patch.region(), Region::ChatLog);
    }

    #[test]
    fn test_push_chat_emits_append() {
        let mut state = state();
        let patch = state.push_chat(ChatEntry::new("user", "Hello", None));
        assert!(matches!(patch, ViewPatch::AppendChat { .. }));
        assert!(patch.html().contains("beforeend:#chatContainer"));
        assert!(patch.html().contains("Hello"));
    }
}
