//! Error types for the tally core crate.

use thiserror::Error;

/// Top-level error type shared by the analytics engine and its ports.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("delivery error: collector returned status {status}")]
    Delivery { status: u16 },

    #[error("forwarder error: {0}")]
    Forwarder(String),
}

impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        TallyError::Serialization(err.to_string())
    }
}

/// A convenience Result alias that defaults to [`TallyError`].
pub type Result<T> = std::result::Result<T, TallyError>;
