//! Automation Chat Console
//!
//! HTML-first chat and live-status console for a browser automation agent.
//! The user talks to the agent through a chat log; while an automation runs,
//! the backend pushes progress, screenshots, completion and errors, and the
//! console renders them as they arrive.
//!
//! # Architecture
//!
//! - **Server**: Axum router serving the page, form posts and an SSE patch stream
//! - **Pages**: one session per page load, each with its own controller
//! - **Controller**: one page session's view state and its two input paths
//! - **Backend**: reqwest client for `POST /chat`, `GET /status` and the push stream
//! - **UI**: server-rendered regions swapped in place by htmx
//!
//! # Modules
//!
//! - [`pages`]: page session registry and lifetime
//! - [`controller`]: UI controller and idle-reset policy
//! - [`push`]: push channel supervisor
//! - [`backend`]: backend traits and HTTP/SSE client
//! - [`protocol`]: wire types and push event decoding
//! - [`view`]: view model, regions and rendering
//! - [`format`]: message formatting and label tables
//! - [`session`]: page session identifiers

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod format;
pub mod pages;
pub mod protocol;
pub mod push;
pub mod server;
pub mod session;
pub mod view;

use crate::pages::PageRegistry;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Open page sessions.
    pub pages: PageRegistry,
}
