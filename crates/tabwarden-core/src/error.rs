//! Error types for Tabwarden.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Remote quota exceeded: {size} bytes (limit {limit})")]
    QuotaExceeded { size: usize, limit: usize },

    #[error("Host error: {0}")]
    Host(String),

    #[error("Tab not found: {0}")]
    TabGone(i64),

    #[error("Malformed import: {0}")]
    MalformedImport(String),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Sync is disabled")]
    SyncDisabled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors the host raises for tabs that vanished mid-operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TabGone(_) | Error::Host(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
