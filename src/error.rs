//! Error types for RelayKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type for RelayKV operations
#[derive(Debug, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Datastore Errors
    // -------------------------------------------------------------------------
    #[error("record does not exist")]
    KeyNotFound,

    #[error("corrupted data file: {0}")]
    Corruption(String),

    #[error("datastore is shutting down")]
    ShuttingDown,

    // -------------------------------------------------------------------------
    // Balancer Errors
    // -------------------------------------------------------------------------
    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("no available backend server")]
    NoHealthyBackend,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}
