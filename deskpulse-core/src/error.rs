//! Error types for deskpulse-core

use thiserror::Error;

/// Main error type for the deskpulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Document store / mirror database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV extract or snapshot error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP transport error from the ticket-source API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Parse error for a raw record
    #[error("parse error in {source_name} data: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A backing tier failed (unavailable, malformed response, auth failure)
    #[error("{tier} unavailable: {message}")]
    Backend { tier: String, message: String },

    /// A backing tier did not answer within its time budget
    #[error("{tier} exceeded timeout of {timeout_ms}ms")]
    TierTimeout { tier: String, timeout_ms: u64 },

    /// Dataset cache error (callers treat this as a miss)
    #[error("cache error: {0}")]
    Cache(String),

    /// Widget not registered
    #[error("widget not found: {0}")]
    WidgetNotFound(String),
}

impl Error {
    /// Build a backend error for the named tier.
    pub fn backend(tier: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            tier: tier.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for deskpulse-core
pub type Result<T> = std::result::Result<T, Error>;
