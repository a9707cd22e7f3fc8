//! Connections to the automation backend.
//!
//! The controller talks to the backend through two traits so tests can script
//! both directions:
//!
//! - [`ChatBackend`]: request/response calls (`POST /chat`, `GET /status`)
//! - [`PushChannel`]: opens the server-to-client event stream
//!
//! [`HttpBackend`] implements both over reqwest.

pub mod http;
pub mod sse;

use std::pin::Pin;

use futures::Stream;

use crate::error::Result;
use crate::protocol::{AutomationSnapshot, ChatRequest, ChatResponse, PushEvent};
use crate::session::SessionId;

pub use http::HttpBackend;
pub use sse::decode_push_stream;

/// Stream of decoded push events.
///
/// Items are `Err` either for a malformed frame (the stream continues) or for
/// a transport failure (the stream ends right after).
pub type PushStream = Pin<Box<dyn Stream<Item = Result<PushEvent>> + Send>>;

/// Request/response side of the backend.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Relay one user message.
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Fetch the current automation snapshot.
    async fn automation_status(&self) -> Result<AutomationSnapshot>;
}

/// Server-to-client side of the backend.
#[async_trait::async_trait]
pub trait PushChannel: Send + Sync {
    /// Open the event stream for a session.
    async fn connect(&self, session_id: &SessionId) -> Result<PushStream>;
}
