//! Layered configuration.
//!
//! Priority, lowest first: built-in defaults, YAML file (`--config` /
//! `CONFIG_FILE`, else `./config.yaml` when present), `CONSOLE_`-prefixed
//! environment variables (`CONSOLE_SERVER__PORT=8000`), CLI flags and their
//! env aliases.

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{ConsoleError, Result};
use crate::session::DEFAULT_SESSION_PREFIX;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the automation backend
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub chat_path: String,
    pub status_path: String,
    pub events_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    /// Delay before a finished or failed automation returns to idle.
    pub reset_delay_ms: u64,
    pub session_prefix: String,
    /// How long a page session survives with no browser attached.
    pub session_grace_ms: u64,
}

impl UiConfig {
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn session_grace(&self) -> Duration {
        Duration::from_millis(self.session_grace_ms)
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            reset_delay_ms: 5000,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            session_grace_ms: 30_000,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)
            .map_err(|e| ConsoleError::Config(config::ConfigError::Message(e.to_string())))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("backend.base_url", "http://127.0.0.1:5000")?
            .set_default("backend.chat_path", "/chat")?
            .set_default("backend.status_path", "/status")?
            .set_default("backend.events_path", "/events")?
            .set_default("ui.reset_delay_ms", 5000)?
            .set_default("ui.session_prefix", DEFAULT_SESSION_PREFIX)?
            .set_default("ui.session_grace_ms", 30_000)?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::from(Path::new(path)).required(true)),
            None => builder.add_source(File::from(Path::new("config.yaml")).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix("CONSOLE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(url) = cli.backend_url {
            builder = builder.set_override("backend.base_url", url)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}
