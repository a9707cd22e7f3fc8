use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        Html,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::AppState;
use crate::backend::{ChatBackend, HttpBackend, PushChannel};
use crate::config::AppConfig;
use crate::controller::{ControllerSettings, SendOutcome, UiController};
use crate::error;
use crate::pages::PageRegistry;
use crate::view::UiState;

/// Page registry wired to the HTTP backend named in `config`.
pub fn page_registry(config: &AppConfig, shutdown: CancellationToken) -> error::Result<PageRegistry> {
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    info!(
        name: "backend.configured",
        chat_url = %backend.chat_url(),
        events_url = %backend.events_url(),
        "Backend endpoints resolved"
    );

    Ok(PageRegistry::new(
        Arc::clone(&backend) as Arc<dyn ChatBackend>,
        backend as Arc<dyn PushChannel>,
        ControllerSettings::from(&config.ui),
        config.ui.session_grace(),
        shutdown,
    ))
}

/// Start the console with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let pages = page_registry(&config, shutdown.clone())?;

    let app = build_router(AppState {
        pages: pages.clone(),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    pages.shutdown().await;
    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or when `token` is cancelled elsewhere.
async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(error = %err, "Failed to listen for shutdown signal");
            }
        }
        () = token.cancelled() => {}
    }
    info!(name: "server.shutdown", "Shutdown requested");
    token.cancel();
}

/// Build the console router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ui/send", post(ui_send))
        .route("/ui/stream", get(ui_stream))
        .route("/ui/visibility", post(ui_visibility))
        .route("/ui/error", post(ui_error))
        .route("/ui/clear", post(ui_clear))
        .route("/ui/close", post(ui_close))
        .route("/ui/state", get(ui_state))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// UI Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Session named by a browser request.
#[derive(Debug, Deserialize)]
struct PageQuery {
    session: String,
}

impl AppState {
    fn page(&self, query: &PageQuery) -> Result<UiController, StatusCode> {
        self.pages.get(&query.session).ok_or_else(|| {
            warn!(session_id = %query.session, "Request for unknown page session");
            StatusCode::NOT_FOUND
        })
    }
}

/// GET / - Open a page session and render its page.
async fn index(State(state): State<AppState>) -> Html<String> {
    Html(state.pages.open().render_page())
}

/// Compose form body.
#[derive(Debug, Deserialize)]
struct ComposeForm {
    #[serde(default)]
    message: String,
}

/// POST /ui/send - Relay one user message.
///
/// The send runs on its own task so a dropped client connection cannot leave
/// the request half-settled.
async fn ui_send(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Form(form): Form<ComposeForm>,
) -> Result<Json<SendOutcome>, StatusCode> {
    let controller = state.page(&query)?;
    tokio::spawn(async move { controller.send_message(&form.message).await })
        .await
        .map(Json)
        .map_err(|err| {
            error!(error = %err, "Send task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// GET /ui/stream - View patches as htmx out-of-band markup.
///
/// The stream opens with a full resync so a page rendered earlier catches up,
/// and ends when the page session is discarded.
async fn ui_stream(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send>, StatusCode> {
    let lease = state.pages.attach(&query.session).ok_or(StatusCode::NOT_FOUND)?;
    let closed = lease.closed();

    let stream = lease
        .controller()
        .patch_stream()
        .take_until(closed)
        .map(move |patch| {
            // The session stays attached for as long as the stream lives.
            let _attached = &lease;
            Ok(Event::default().event("patch").data(patch.html()))
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// Page visibility report.
#[derive(Debug, Deserialize)]
struct VisibilityReport {
    visible: bool,
}

#[derive(Debug, Serialize)]
struct VisibilityResponse {
    reconnect_requested: bool,
}

/// POST /ui/visibility - Page visibility changed.
async fn ui_visibility(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Json(report): Json<VisibilityReport>,
) -> Result<Json<VisibilityResponse>, StatusCode> {
    Ok(Json(VisibilityResponse {
        reconnect_requested: state.page(&query)?.on_visibility_change(report.visible),
    }))
}

/// Uncaught error reported by the page.
#[derive(Debug, Deserialize)]
struct ClientErrorReport {
    #[serde(default)]
    message: Option<String>,
}

/// POST /ui/error - Global error handler for the page.
async fn ui_error(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Json(report): Json<ClientErrorReport>,
) -> StatusCode {
    let detail = report.message.unwrap_or_else(|| "unknown client error".to_string());
    match state.page(&query) {
        Ok(controller) => {
            controller.report_unhandled_error(&detail);
            StatusCode::NO_CONTENT
        }
        Err(status) => status,
    }
}

/// POST /ui/clear - Clear the chat log, keeping system entries.
async fn ui_clear(State(state): State<AppState>, Query(query): Query<PageQuery>) -> StatusCode {
    match state.page(&query) {
        Ok(controller) => {
            controller.clear_chat();
            StatusCode::NO_CONTENT
        }
        Err(status) => status,
    }
}

/// POST /ui/close - The page is being unloaded.
async fn ui_close(State(state): State<AppState>, Query(query): Query<PageQuery>) -> StatusCode {
    if state.pages.close(&query.session) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// GET /ui/state - Current view model as JSON.
async fn ui_state(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<UiState>, StatusCode> {
    Ok(Json(state.page(&query)?.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, ServerConfig, UiConfig};

    fn config(base_url: &str) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
            },
            backend: BackendConfig {
                base_url: base_url.to_string(),
                chat_path: "/chat".to_string(),
                status_path: "/status".to_string(),
                events_path: "/events".to_string(),
            },
            ui: UiConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_page_registry_serves_pages_over_http_backend() {
        let shutdown = CancellationToken::new();
        let pages = page_registry(&config("http://127.0.0.1:9"), shutdown).unwrap();

        let controller = pages.open();
        assert!(pages.get(controller.session_id().as_str()).is_some());

        tokio::time::timeout(Duration::from_secs(5), pages.shutdown())
            .await
            .expect("page tasks should stop");
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn test_page_registry_rejects_bad_backend_url() {
        let err = page_registry(&config("not a url"), CancellationToken::new()).unwrap_err();
        assert!(matches!(err, crate::error::ConsoleError::InvalidUrl(_)));
    }
}
