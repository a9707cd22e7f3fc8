//! HTML rendering for the console page.
//!
//! Every region renders as one element carrying its DOM id, so the same markup
//! serves the initial page and, with `hx-swap-oob`, the live patches. URLs in
//! the page carry the page's session id as the `session` query parameter.

use maud::{DOCTYPE, Markup, PreEscaped, html};

use crate::format::{css_token, format_message, multiline};

use super::{ChatEntry, Region, UiState};

const HTMX_SRC: &str = "https://unpkg.com/htmx.org@2.0.8";
const HTMX_SSE_SRC: &str = "https://unpkg.com/htmx-ext-sse@2.2.2";

/// How a region is being emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swap {
    /// Part of the full page.
    InPlace,
    /// Out-of-band replacement pushed over SSE.
    OutOfBand,
}

impl Swap {
    fn oob(self) -> Option<&'static str> {
        match self {
            Self::InPlace => None,
            Self::OutOfBand => Some("true"),
        }
    }
}

fn display(visible: bool) -> &'static str {
    if visible { "block" } else { "none" }
}

fn running_class(running: bool) -> &'static str {
    if running { " running" } else { "" }
}

/// `path?session=<id>`, form-encoded.
pub fn session_url(path: &str, session_id: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("session", session_id)
        .finish();
    format!("{path}?{query}")
}

/// Render one region of `state`.
pub fn region(region: Region, state: &UiState, swap: Swap) -> String {
    region_markup(region, state, swap).into_string()
}

fn region_markup(region: Region, state: &UiState, swap: Swap) -> Markup {
    let id = region.dom_id();
    let oob = swap.oob();
    match region {
        Region::ChatLog => html! {
            div id=(id) class="chat-container" hx-swap-oob=[oob] {
                @for entry in &state.chat {
                    (entry_markup(entry))
                }
            }
        },
        Region::InputBar => {
            let busy = !state.input.enabled;
            html! {
                form id=(id) class="chat-input-bar"
                    hx-post=(session_url("/ui/send", &state.session_id))
                    hx-swap="none"
                    hx-swap-oob=[oob] {
                    input id="chatInput" name="message" type="text" autocomplete="off"
                        placeholder=(state.input.placeholder) disabled[busy] autofocus;
                    button id="sendButton" type="submit" disabled[busy] { "Send" }
                }
            }
        }
        Region::ConnectionStatus => html! {
            div id=(id) class={"connection-status " (state.connection.css_class())} hx-swap-oob=[oob] {
                (state.connection.label())
            }
        },
        Region::AgentStatus => html! {
            div id=(id) class={"agent-status" (running_class(state.agent_status.running))} hx-swap-oob=[oob] {
                (state.agent_status.text)
            }
        },
        Region::AutomationStatus => html! {
            div id=(id) class={"automation-status" (running_class(state.automation_status.running))} hx-swap-oob=[oob] {
                (state.automation_status.text)
            }
        },
        Region::ProgressSection => {
            let percent = state.progress.percent.to_string();
            html! {
                div id=(id) class="progress-section" style={"display: " (display(state.progress.visible)) ";"} hx-swap-oob=[oob] {
                    div class="progress-bar" {
                        div id="progressFill" class="progress-fill" style={"width: " (percent) "%;"} {}
                    }
                    div id="progressText" class="progress-text" { (percent) "%" }
                    div id="currentStep" class="current-step" { (state.progress.step) }
                }
            }
        }
        Region::ScreenshotPane => html! {
            div id=(id) class="screenshot-container" hx-swap-oob=[oob] {
                @if let Some(frame) = &state.screenshot {
                    div class="screenshot-frame" {
                        h3 { (frame.step) }
                        img src=(frame.image) alt="Live Screenshot";
                        p class="screenshot-time" { "Updated: " (frame.timestamp) }
                    }
                } @else {
                    div class="screenshot-placeholder" { "Screenshots will appear here once automation starts" }
                }
            }
        },
        Region::ScreenshotInfo => html! {
            div id=(id) class="screenshot-info" hx-swap-oob=[oob] {
                span { "URL: " span id="currentUrl" { (state.screenshot_info.current_url) } }
                span { "Last update: " span id="lastUpdate" { (state.screenshot_info.last_update) } }
            }
        },
        Region::EmailPreview => html! {
            div id=(id) class="email-preview-section" style={"display: " (display(state.email_preview.is_some())) ";"} hx-swap-oob=[oob] {
                h3 { "Email Preview" }
                div id="emailPreviewContent" {
                    @if let Some(email) = &state.email_preview {
                        div class="email-field" {
                            label { "Subject:" }
                            div class="field-value" { (email.subject) }
                        }
                        div class="email-field" {
                            label { "Body:" }
                            div class="field-value" { (PreEscaped(multiline(&email.body))) }
                        }
                    }
                }
            }
        },
    }
}

fn entry_markup(entry: &ChatEntry) -> Markup {
    html! {
        div class={"chat-message " (css_token(entry.kind.as_str()))} {
            div class="message-avatar" { (entry.kind.avatar()) }
            div class="message-content" {
                // Escaped by the formatter before markup substitution.
                div class="message-text" { (PreEscaped(format_message(&entry.text))) }
                div class="message-time" { (entry.timestamp) }
            }
        }
    }
}

/// Render a single chat entry.
pub fn chat_entry(entry: &ChatEntry) -> String {
    entry_markup(entry).into_string()
}

/// Chat entry wrapped for an out-of-band append to the log.
pub fn appended_chat_entry(entry: &ChatEntry) -> String {
    html! {
        div hx-swap-oob={"beforeend:#" (Region::ChatLog.dom_id())} {
            (entry_markup(entry))
        }
    }
    .into_string()
}

/// Full page for the current state.
pub fn page(state: &UiState) -> String {
    let r = |which: Region| region_markup(which, state, Swap::InPlace);
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "Automation Console" }
                script src=(HTMX_SRC) {}
                script src=(HTMX_SSE_SRC) {}
                script defer src="/static/console.js" {}
                link rel="stylesheet" href="/static/console.css";
            }
            body {
                div class="console"
                    data-session=(state.session_id)
                    hx-ext="sse"
                    sse-connect=(session_url("/ui/stream", &state.session_id)) {
                    div id="patchSink" sse-swap="patch" hx-swap="none" {}
                    section class="chat-panel" {
                        header class="panel-header" {
                            h2 { "Automation Assistant" }
                            (r(Region::ConnectionStatus))
                        }
                        (r(Region::AgentStatus))
                        (r(Region::ChatLog))
                        (r(Region::InputBar))
                    }
                    section class="status-panel" {
                        header class="panel-header" {
                            h2 { "Live Automation" }
                            (r(Region::AutomationStatus))
                        }
                        (r(Region::ProgressSection))
                        (r(Region::ScreenshotPane))
                        (r(Region::ScreenshotInfo))
                        (r(Region::EmailPreview))
                    }
                }
            }
        }
    }
    .into_string()
}
