//! Text formatting and fixed display tables.
//!
//! Server-provided text is HTML-escaped before the lightweight markup pass, so
//! only the markup this module produces ever reaches the page as tags.

use std::sync::LazyLock;

use chrono::Local;
use maud::html;
use regex::Regex;

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern is valid"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("italic pattern is valid"));

/// Agent label used for unmapped or absent reply types.
pub const DEFAULT_AGENT_LABEL: &str = "Ready";

/// Avatar for kinds missing from the table.
pub const DEFAULT_AVATAR: &str = "🤖";

/// Escape text for HTML content or attribute values.
pub fn escape_html(text: &str) -> String {
    html! { (text) }.into_string()
}

/// Render chat text as HTML.
///
/// Newlines become `<br>`, `**text**` becomes bold and `*text*` italic, in
/// that order and non-greedy.
///
/// ```rust
/// use automation_chat_console::format::format_message;
///
/// assert_eq!(format_message("**Hi** *there*"), "<strong>Hi</strong> <em>there</em>");
/// ```
pub fn format_message(text: &str) -> String {
    let html = escape_html(text).replace('\n', "<br>");
    let html = BOLD.replace_all(&html, "<strong>$1</strong>");
    ITALIC.replace_all(&html, "<em>$1</em>").into_owned()
}

/// Escape text and turn newlines into `<br>`, without markup.
pub fn multiline(text: &str) -> String {
    escape_html(text).replace('\n', "<br>")
}

/// Avatar glyph for a message kind.
pub fn avatar_for(kind: &str) -> &'static str {
    match kind {
        "user" => "👤",
        "system" => "🤖",
        "success" => "✅",
        "error" => "❌",
        "username_request" => "👋",
        "gmail_request" => "📧",
        "password_request" => "🔐",
        "recipient_request" => "📬",
        "ready_to_send" => "🚀",
        _ => DEFAULT_AVATAR,
    }
}

/// Agent status label for a chat reply type.
pub fn agent_label_for(kind: Option<&str>) -> &'static str {
    match kind {
        Some("username_request") => "Waiting for your name",
        Some("gmail_request") => "Waiting for Gmail address",
        Some("password_request") => "Waiting for password",
        Some("recipient_request") => "Waiting for recipient",
        Some("ready_to_send") => "Starting automation...",
        _ => DEFAULT_AGENT_LABEL,
    }
}

/// Whether an agent label should be shown in the running style.
pub fn is_running_agent_label(label: &str) -> bool {
    label.contains("automation") || label.contains("Starting")
}

/// Current local wall-clock time, `HH:MM:SS`.
pub fn local_time_label() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// CSS class fragment derived from a free-form kind.
///
/// Keeps `[a-z0-9_-]` so server-chosen kinds cannot break out of the
/// attribute.
pub fn css_token(kind: &str) -> String {
    kind.chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
        .collect()
}
