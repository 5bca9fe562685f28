//! Error types for the vuanh-offline library.

use thiserror::Error;

/// Errors that can occur in cache, storage and network operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The network is unreachable.
    #[error("Network is offline")]
    Offline,

    /// A precache manifest entry could not be fetched during install.
    #[error("Precache failed for {url}: {reason}")]
    Precache {
        /// URL of the manifest entry that failed.
        url: String,
        /// Why the fetch failed.
        reason: String,
    },

    /// Durable storage is unavailable.
    #[error("Storage unavailable: {0}")]
    Storage(String),

    /// Cache store operation failed.
    #[error("Cache error: {0}")]
    Cache(String),
}

/// A specialized `Result` type for vuanh-offline operations.
pub type Result<T> = std::result::Result<T, Error>;
