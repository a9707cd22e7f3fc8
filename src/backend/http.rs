//! reqwest implementation of the backend traits.

use tracing::debug;
use url::Url;

use crate::config::BackendConfig;
use crate::error::{ConsoleError, Result};
use crate::protocol::{AutomationSnapshot, ChatRequest, ChatResponse};
use crate::session::SessionId;

use super::{ChatBackend, PushChannel, PushStream, sse::decode_push_stream};

/// HTTP client for the automation backend.
///
/// No request timeout is configured: a chat request stays in flight until the
/// backend answers or the connection fails.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    chat_url: Url,
    status_url: Url,
    events_url: Url,
}

impl HttpBackend {
    /// Create a client from backend settings.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create a client with a custom reqwest client.
    pub fn with_client(config: &BackendConfig, http: reqwest::Client) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        Ok(Self {
            http,
            chat_url: base.join(&config.chat_path)?,
            status_url: base.join(&config.status_path)?,
            events_url: base.join(&config.events_path)?,
        })
    }

    pub fn chat_url(&self) -> &Url {
        &self.chat_url
    }

    pub fn events_url(&self) -> &Url {
        &self.events_url
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());
            Err(ConsoleError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait::async_trait]
impl ChatBackend for HttpBackend {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        debug!(url = %self.chat_url, session_id = %request.session_id, "Sending chat request");
        let response = self
            .http
            .post(self.chat_url.clone())
            .json(request)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn automation_status(&self) -> Result<AutomationSnapshot> {
        let response = self.http.get(self.status_url.clone()).send().await?;
        Self::handle_response(response).await
    }
}

#[async_trait::async_trait]
impl PushChannel for HttpBackend {
    async fn connect(&self, session_id: &SessionId) -> Result<PushStream> {
        let mut url = self.events_url.clone();
        url.query_pairs_mut()
            .append_pair("session_id", session_id.as_str());

        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        Ok(Box::pin(decode_push_stream(response.bytes_stream())))
    }
}
