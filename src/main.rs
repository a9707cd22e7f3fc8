//! Automation Chat Console Server
//!
//! Entry point: loads configuration and serves the console.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use automation_chat_console::config::AppConfig;
use automation_chat_console::server;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before anything reads the environment
    let _ = dotenv();

    // Initialize tracing (M-LOG-STRUCTURED); LOG_FORMAT=json for machine-readable output
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true)))
        .init();

    let config = AppConfig::load()?;
    info!(
        name: "config.loaded",
        backend = %config.backend.base_url,
        port = config.server.port,
        reset_delay_ms = config.ui.reset_delay_ms,
        session_grace_ms = config.ui.session_grace_ms,
        "Configuration loaded"
    );

    server::start_server(Arc::new(config)).await
}
