//! Page session registry.
//!
//! Every page load opens its own session: a fresh [`UiController`] with its
//! own [`SessionId`](crate::session::SessionId) and a push supervisor task.
//! Browser requests name their session with the `session` query parameter.
//!
//! A session is discarded when the page reports it is being unloaded, or when
//! no patch stream has been attached to it for the grace period (covers tabs
//! that vanish without saying goodbye).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::backend::{ChatBackend, PushChannel};
use crate::controller::{ControllerSettings, UiController};
use crate::push::run_push_channel;

struct Page {
    controller: UiController,
    /// Stops the page's push supervisor and ends its patch streams.
    cancel: CancellationToken,
    /// Open patch streams.
    attached: usize,
    /// Bumped on every attach and detach; a pending reap only applies if it
    /// still matches.
    generation: u64,
}

struct RegistryInner {
    backend: Arc<dyn ChatBackend>,
    channel: Arc<dyn PushChannel>,
    settings: ControllerSettings,
    grace: Duration,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    pages: RwLock<HashMap<String, Page>>,
}

/// Thread-safe registry of open page sessions.
#[derive(Clone)]
pub struct PageRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for PageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRegistry")
            .field("pages", &self.len())
            .field("grace", &self.inner.grace)
            .finish()
    }
}

impl PageRegistry {
    /// Create an empty registry. Cancelling `shutdown` stops every page.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        channel: Arc<dyn PushChannel>,
        settings: ControllerSettings,
        grace: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                backend,
                channel,
                settings,
                grace,
                shutdown,
                tasks: TaskTracker::new(),
                pages: RwLock::new(HashMap::new()),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Page>> {
        self.inner.pages.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Page>> {
        self.inner.pages.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a session for a new page load and start its push supervisor.
    pub fn open(&self) -> UiController {
        let controller = UiController::new(Arc::clone(&self.inner.backend), self.inner.settings.clone());
        let cancel = self.inner.shutdown.child_token();
        self.inner.tasks.spawn(run_push_channel(
            controller.clone(),
            Arc::clone(&self.inner.channel),
            cancel.clone(),
        ));

        let id = controller.session_id().to_string();
        let open_pages = {
            let mut pages = self.write();
            pages.insert(
                id.clone(),
                Page {
                    controller: controller.clone(),
                    cancel,
                    attached: 0,
                    generation: 0,
                },
            );
            pages.len()
        };
        info!(name: "page.opened", session_id = %id, open_pages, "Page session opened");

        self.schedule_reap(id, 0);
        controller
    }

    /// Controller of an open session.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<UiController> {
        self.read().get(session_id).map(|page| page.controller.clone())
    }

    /// Attach a patch stream to a session. The session is kept alive until
    /// the returned lease is dropped.
    #[must_use]
    pub fn attach(&self, session_id: &str) -> Option<PageLease> {
        let mut pages = self.write();
        let page = pages.get_mut(session_id)?;
        page.attached += 1;
        page.generation += 1;
        debug!(session_id, attached = page.attached, "Patch stream attached");
        Some(PageLease {
            registry: self.clone(),
            session_id: session_id.to_string(),
            controller: page.controller.clone(),
            closed: page.cancel.clone(),
        })
    }

    fn detach(&self, session_id: &str) {
        let generation = {
            let mut pages = self.write();
            let Some(page) = pages.get_mut(session_id) else {
                return;
            };
            page.attached = page.attached.saturating_sub(1);
            page.generation += 1;
            debug!(session_id, attached = page.attached, "Patch stream detached");
            if page.attached > 0 {
                return;
            }
            page.generation
        };
        self.schedule_reap(session_id.to_string(), generation);
    }

    /// Discard the session unless a stream attaches within the grace period.
    fn schedule_reap(&self, session_id: String, generation: u64) {
        // Leases dropped outside a runtime cannot arm a timer; the session
        // then lives until closed explicitly or the registry shuts down.
        if tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let registry = self.clone();
        let grace = self.inner.grace;
        self.inner.tasks.spawn(async move {
            tokio::select! {
                () = registry.inner.shutdown.cancelled() => return,
                () = tokio::time::sleep(grace) => {}
            }
            let expired = {
                let mut pages = registry.write();
                match pages.get(&session_id) {
                    Some(page) if page.attached == 0 && page.generation == generation => {
                        pages.remove(&session_id)
                    }
                    _ => None,
                }
            };
            if let Some(page) = expired {
                page.cancel.cancel();
                info!(name: "page.expired", session_id = %session_id, "Page session expired");
            }
        });
    }

    /// Discard a session. Returns `false` if it was not open.
    pub fn close(&self, session_id: &str) -> bool {
        let Some(page) = self.write().remove(session_id) else {
            return false;
        };
        page.cancel.cancel();
        info!(name: "page.closed", session_id, "Page session closed");
        true
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every session and wait for their tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.write().clear();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }
}

/// An attached patch stream's hold on its session.
#[derive(Debug)]
pub struct PageLease {
    registry: PageRegistry,
    session_id: String,
    controller: UiController,
    closed: CancellationToken,
}

impl PageLease {
    pub fn controller(&self) -> &UiController {
        &self.controller
    }

    /// Resolves once the session is closed, expired or shut down.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.closed.clone().cancelled_owned()
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        self.registry.detach(&self.session_id);
    }
}
