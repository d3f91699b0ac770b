//! Unified error types for the server.
//!
//! Every fallible operation in the crate returns [`Result`]. HTTP handlers
//! translate these into status codes in [`crate::api::error`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the server and its update subsystem.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    /// Failure talking to the durable store
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem or process I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A `git` invocation exited unsuccessfully or could not be started
    #[error("git {command} failed: {message}")]
    Git {
        /// The git subcommand that failed (e.g. `fetch`)
        command: String,
        /// stderr output or spawn error
        message: String,
    },

    /// A revision identifier that is not a plain hex string
    #[error("Invalid revision identifier: {revision}")]
    InvalidRevision {
        /// The rejected input
        revision: String,
    },

    /// The platform restart script is not installed next to the server
    #[error("Restart script not found at {}", path.display())]
    RestartScriptMissing {
        /// Where the script was expected
        path: PathBuf,
    },

    /// Credential or session failure
    #[error("Authentication error: {message}")]
    Auth {
        /// Description of the failure
        message: String,
    },

    /// Outbound HTTP request failure (update poller client)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encode/decode failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
