//! Chat/status UI controller.
//!
//! [`UiController`] owns the page session: its [`SessionId`], the view model of
//! every display region and the in-flight flag for chat requests. It is a
//! cheap handle over shared state; clones drive the same page.
//!
//! Two independent inputs mutate the view:
//!
//! - the request/response cycle started by [`UiController::send_message`]
//! - push events from the backend, fed in by the push supervisor through
//!   [`UiController::handle_push`]
//!
//! They may interleave in any order; each region is last-write-wins. Every
//! mutation publishes [`ViewPatch`]es, in mutation order, to subscribers.
//!
//! # Example
//!
//! ```rust,ignore
//! let controller = UiController::new(backend, ControllerSettings::default());
//! let outcome = controller.send_message("Hello").await;
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{Notify, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, error, info, warn};

use crate::backend::ChatBackend;
use crate::config::UiConfig;
use crate::error::Result;
use crate::format::{DEFAULT_AGENT_LABEL, agent_label_for, local_time_label};
use crate::protocol::{
    AutomationComplete, AutomationError, ChatRequest, ChatResponse, PushEvent, StatusUpdate,
};
use crate::session::SessionId;
use crate::view::{
    AUTOMATION_COMPLETED, AUTOMATION_FAILED, AUTOMATION_IDLE, AUTOMATION_INITIALIZING, ChatEntry,
    ConnectionState, MessageKind, Region, ScreenshotFrame, Swap, UiState, ViewPatch, render,
};

/// Shown when a chat request fails in transport or decoding.
pub const SEND_FAILED_MESSAGE: &str =
    "Sorry, there was an error processing your message. Please try again.";

/// Shown by the global error handler.
pub const UNEXPECTED_ERROR_MESSAGE: &str =
    "An unexpected error occurred. Please refresh the page if issues persist.";

/// Shown for an `error` push event without a message.
pub const PUSH_ERROR_FALLBACK: &str = "An unexpected error occurred";

/// Kind used when the backend does not declare one.
const DEFAULT_KIND: &str = "system";

/// Buffered patches per subscriber before it starts lagging.
const PATCH_CHANNEL_CAPACITY: usize = 256;

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Delay before a finished automation returns to idle.
    pub reset_delay: Duration,
    /// Prefix for the generated session id.
    pub session_prefix: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&UiConfig::default())
    }
}

impl From<&UiConfig> for ControllerSettings {
    fn from(config: &UiConfig) -> Self {
        Self {
            reset_delay: config.reset_delay(),
            session_prefix: config.session_prefix.clone(),
        }
    }
}

/// Why a send was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    EmptyInput,
    RequestInFlight,
}

/// Result of [`UiController::send_message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    /// Nothing was sent.
    Ignored { reason: IgnoreReason },
    /// The backend answered; `kind` is the declared reply type.
    Delivered { kind: Option<String> },
    /// The request failed; an error entry was appended.
    Failed { error: String },
}

struct Shared {
    ui: UiState,
    /// Bumped by every scheduled idle reset; only the latest one applies.
    reset_generation: u64,
    /// A reconnect was requested and the supervisor has not reported back.
    reconnect_pending: bool,
}

struct Inner {
    session_id: SessionId,
    backend: Arc<dyn ChatBackend>,
    shared: Mutex<Shared>,
    patches: broadcast::Sender<ViewPatch>,
    reset_delay: Duration,
    reconnect: Notify,
}

/// Handle to the page session's UI controller.
#[derive(Clone)]
pub struct UiController {
    inner: Arc<Inner>,
}

impl fmt::Debug for UiController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiController")
            .field("session_id", &self.inner.session_id)
            .field("reset_delay", &self.inner.reset_delay)
            .finish()
    }
}

impl UiController {
    /// Create the controller for a new page session.
    pub fn new(backend: Arc<dyn ChatBackend>, settings: ControllerSettings) -> Self {
        let session_id = SessionId::generate(&settings.session_prefix);
        let (patches, _) = broadcast::channel(PATCH_CHANNEL_CAPACITY);
        info!(name: "session.created", session_id = %session_id, "Page session created");
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    ui: UiState::new(session_id.as_str()),
                    reset_generation: 0,
                    reconnect_pending: false,
                }),
                session_id,
                backend,
                patches,
                reset_delay: settings.reset_delay,
                reconnect: Notify::new(),
            }),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Copy of the current view model.
    pub fn snapshot(&self) -> UiState {
        self.with_shared(|shared, _| shared.ui.clone())
    }

    pub fn connection(&self) -> ConnectionState {
        self.with_shared(|shared, _| shared.ui.connection)
    }

    /// Full page markup for the current state.
    pub fn render_page(&self) -> String {
        self.with_shared(|shared, _| render::page(&shared.ui))
    }

    /// Subscribe to future patches.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewPatch> {
        self.inner.patches.subscribe()
    }

    /// Subscribe and get patches that bring a stale page up to date.
    ///
    /// Both are taken under the state lock, so no mutation falls between the
    /// resync and the first received patch.
    pub fn subscribe_with_resync(&self) -> (Vec<ViewPatch>, broadcast::Receiver<ViewPatch>) {
        self.with_shared(|shared, _| {
            let rx = self.inner.patches.subscribe();
            let resync = [
                Region::ChatLog,
                Region::InputBar,
                Region::ConnectionStatus,
                Region::AgentStatus,
                Region::AutomationStatus,
                Region::ProgressSection,
                Region::ScreenshotPane,
                Region::ScreenshotInfo,
                Region::EmailPreview,
            ]
            .into_iter()
            .map(|region| ViewPatch::Replace {
                region,
                html: render::region(region, &shared.ui, Swap::OutOfBand),
            })
            .collect();
            (resync, rx)
        })
    }

    /// Endless patch feed for one browser stream.
    ///
    /// Opens with a full resync. A subscriber that falls more than the
    /// channel capacity behind is resubscribed and resynced instead of
    /// silently missing patches.
    pub fn patch_stream(&self) -> impl Stream<Item = ViewPatch> + Send + use<> {
        let controller = self.clone();
        stream! {
            'resubscribe: loop {
                let (resync, rx) = controller.subscribe_with_resync();
                for patch in resync {
                    yield patch;
                }
                let mut live = BroadcastStream::new(rx);
                loop {
                    match live.next().await {
                        Some(Ok(patch)) => yield patch,
                        Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                            warn!(
                                name: "ui.patches_lagged",
                                session_id = %controller.session_id(),
                                skipped,
                                "Patch subscriber lagged; resyncing"
                            );
                            break;
                        }
                        None => break 'resubscribe,
                    }
                }
            }
        }
    }

    /// Run `f` under the state lock, publishing the patches it collects.
    fn with_shared<R>(&self, f: impl FnOnce(&mut Shared, &mut Vec<ViewPatch>) -> R) -> R {
        let mut guard = self
            .inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut patches = Vec::new();
        let result = f(&mut guard, &mut patches);
        for patch in patches {
            // No subscribers is fine; the page re-renders from state on load.
            let _ = self.inner.patches.send(patch);
        }
        result
    }

    fn update<R>(&self, f: impl FnOnce(&mut UiState, &mut Vec<ViewPatch>) -> R) -> R {
        self.with_shared(|shared, patches| f(&mut shared.ui, patches))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Request/response cycle
    // ─────────────────────────────────────────────────────────────────────

    /// Relay one user message to the backend.
    ///
    /// A no-op when the trimmed input is empty or another request is in
    /// flight. Whatever the backend does, input is re-enabled and the
    /// in-flight flag cleared once the request settles.
    pub async fn send_message(&self, raw: &str) -> SendOutcome {
        let message = raw.trim();

        let claimed = self.update(|state, patches| {
            if message.is_empty() {
                return Err(IgnoreReason::EmptyInput);
            }
            if state.waiting_for_response {
                return Err(IgnoreReason::RequestInFlight);
            }
            patches.push(state.push_chat(ChatEntry::new(MessageKind::User, message, None)));
            patches.push(state.set_input_enabled(false));
            state.waiting_for_response = true;
            Ok(())
        });
        if let Err(reason) = claimed {
            debug!(?reason, "Send ignored");
            return SendOutcome::Ignored { reason };
        }

        let request = ChatRequest {
            message: message.to_string(),
            session_id: self.inner.session_id.to_string(),
        };

        let outcome = match self.inner.backend.send_chat(&request).await {
            Ok(response) => {
                self.handle_chat_response(&response);
                SendOutcome::Delivered {
                    kind: response.kind,
                }
            }
            Err(err) => {
                warn!(name: "chat.request_failed", error = %err, "Chat request failed");
                self.append_chat(MessageKind::Error, SEND_FAILED_MESSAGE, None);
                SendOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        self.update(|state, patches| {
            patches.push(state.set_input_enabled(true));
            state.waiting_for_response = false;
        });
        outcome
    }

    /// Show a chat reply and map its type onto the agent status.
    pub fn handle_chat_response(&self, response: &ChatResponse) {
        let declared = response.kind.as_deref().filter(|kind| !kind.is_empty());
        self.update(|state, patches| {
            patches.push(state.push_chat(ChatEntry::new(
                declared.unwrap_or(DEFAULT_KIND),
                response.response.clone(),
                None,
            )));
            patches.push(state.set_agent_status(agent_label_for(declared)));
            if declared == Some("ready_to_send") {
                patches.extend(state.set_automation_status(AUTOMATION_INITIALIZING));
            }
        });
    }

    /// Append one entry to the chat log.
    pub fn append_chat(
        &self,
        kind: impl Into<MessageKind>,
        text: impl Into<String>,
        timestamp: Option<String>,
    ) {
        let entry = ChatEntry::new(kind, text, timestamp);
        self.update(|state, patches| patches.push(state.push_chat(entry)));
    }

    /// Remove every non-`system` entry from the chat log.
    pub fn clear_chat(&self) {
        self.update(|state, patches| patches.push(state.clear_chat()));
    }

    /// Global error handler: tell the user, attempt no recovery.
    pub fn report_unhandled_error(&self, error: &dyn fmt::Display) {
        error!(name: "ui.unhandled_error", error = %error, "Unhandled error");
        self.append_chat(MessageKind::Error, UNEXPECTED_ERROR_MESSAGE, None);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Push channel
    // ─────────────────────────────────────────────────────────────────────

    pub fn on_connect(&self) {
        info!(name: "push.connected", session_id = %self.inner.session_id, "Connected to backend");
        self.with_shared(|shared, patches| {
            shared.reconnect_pending = false;
            patches.push(shared.ui.set_connection(ConnectionState::Connected));
        });
    }

    pub fn on_disconnect(&self) {
        info!(name: "push.disconnected", session_id = %self.inner.session_id, "Disconnected from backend");
        self.with_shared(|shared, patches| {
            shared.reconnect_pending = false;
            patches.push(shared.ui.set_connection(ConnectionState::Disconnected));
        });
    }

    /// Apply one push event.
    pub fn handle_push(&self, event: PushEvent) {
        debug!(event = event.event_name(), "Push event received");
        match event {
            PushEvent::Connected(greeting) => {
                info!(name: "push.greeting", greeting = %greeting.message, "Server connection confirmed");
            }
            PushEvent::StatusUpdate(update) => self.apply_status_update(update),
            PushEvent::AutomationComplete(done) => self.complete_automation(done),
            PushEvent::AutomationError(failure) => self.fail_automation(&failure),
            PushEvent::ChatMessage(msg) => {
                let kind = msg
                    .kind
                    .filter(|kind| !kind.is_empty())
                    .unwrap_or_else(|| DEFAULT_KIND.to_string());
                self.append_chat(kind.as_str(), msg.message, msg.timestamp);
            }
            PushEvent::Error(err) => {
                warn!(name: "push.error_event", detail = ?err.message, "Backend reported an error");
                let text = err
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| PUSH_ERROR_FALLBACK.to_string());
                self.append_chat(MessageKind::Error, text, None);
            }
        }
    }

    fn apply_status_update(&self, update: StatusUpdate) {
        self.update(|state, patches| {
            patches.extend(state.update_progress(update.progress, &update.step));

            let Some(image) = update.screenshot.filter(|s| !s.is_empty()) else {
                return;
            };
            let frame = ScreenshotFrame {
                image,
                step: update.step,
                timestamp: update.timestamp.unwrap_or_else(local_time_label),
            };
            let url = update.url.as_deref().filter(|u| !u.is_empty());
            patches.extend(state.update_screenshot(frame, url));
        });
    }

    fn complete_automation(&self, done: AutomationComplete) {
        info!(name: "automation.completed", "Automation completed");
        self.update(|state, patches| {
            patches.extend(state.set_automation_status(AUTOMATION_COMPLETED));
            patches.push(state.set_agent_status(DEFAULT_AGENT_LABEL));
            patches.push(state.push_chat(ChatEntry::new(MessageKind::Success, done.message, None)));
            if let Some(email) = done.email_content {
                patches.push(state.show_email_preview(email));
            }
        });
        self.schedule_idle_reset();
    }

    fn fail_automation(&self, failure: &AutomationError) {
        warn!(name: "automation.failed", error = %failure.error, "Automation failed");
        self.update(|state, patches| {
            patches.extend(state.set_automation_status(AUTOMATION_FAILED));
            patches.push(state.set_agent_status(DEFAULT_AGENT_LABEL));
            patches.push(state.push_chat(ChatEntry::new(
                MessageKind::Error,
                format!("Automation failed: {}", failure.error),
                None,
            )));
        });
        self.schedule_idle_reset();
    }

    /// Return the automation panel to idle after the reset delay.
    ///
    /// Scheduling again before the delay elapses supersedes the pending reset.
    fn schedule_idle_reset(&self) {
        let generation = self.with_shared(|shared, _| {
            shared.reset_generation += 1;
            shared.reset_generation
        });
        let controller = self.clone();
        let delay = self.inner.reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.with_shared(|shared, patches| {
                if shared.reset_generation == generation {
                    patches.extend(shared.ui.set_automation_status(AUTOMATION_IDLE));
                } else {
                    debug!(generation, "Idle reset superseded");
                }
            });
        });
    }

    /// Pull the backend's automation snapshot and show a run already in progress.
    pub async fn sync_automation_status(&self) -> Result<()> {
        let snapshot = self.inner.backend.automation_status().await?;
        debug!(running = snapshot.running, progress = snapshot.progress, "Automation snapshot");
        if snapshot.running {
            self.update(|state, patches| {
                patches.extend(state.update_progress(snapshot.progress, &snapshot.current_step));
            });
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Visibility
    // ─────────────────────────────────────────────────────────────────────

    /// Page visibility hook. Requests one immediate reconnect when the page
    /// becomes visible while the channel is disconnected.
    ///
    /// Further reports are ignored until the supervisor next connects or
    /// disconnects, so repeated focus changes queue a single attempt.
    pub fn on_visibility_change(&self, visible: bool) -> bool {
        let requested = self.with_shared(|shared, _| {
            if !visible
                || shared.ui.connection != ConnectionState::Disconnected
                || shared.reconnect_pending
            {
                return false;
            }
            shared.reconnect_pending = true;
            true
        });
        if requested {
            info!(name: "push.reconnect_requested", "Page visible while disconnected; reconnecting");
            self.inner.reconnect.notify_one();
        }
        requested
    }

    /// Resolves when a reconnect has been requested.
    pub async fn reconnect_requested(&self) {
        self.inner.reconnect.notified().await;
    }
}
