//! Error types for the console.

use thiserror::Error;

/// Console error type.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// HTTP request to the backend failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid backend URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, or a placeholder when it could not be read.
        message: String,
    },

    /// A push frame named a known event but its payload did not decode.
    #[error("Malformed push event `{event}`: {source}")]
    MalformedPush {
        /// Event name from the frame.
        event: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ConsoleError {
    /// Whether the push stream may keep going after this error.
    ///
    /// Only per-frame decode failures are recoverable; anything else means the
    /// underlying connection is gone.
    pub fn is_recoverable_push_error(&self) -> bool {
        matches!(self, Self::MalformedPush { .. })
    }
}

/// Result type alias for console operations.
pub type Result<T> = std::result::Result<T, ConsoleError>;
