//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Messages never carry secret material.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Grant or envelope serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Sealing or unsealing a stored secret failed.
    #[error("sealed secret error: {0}")]
    Sealing(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking worker running a database call failed.
    #[error("storage task failed: {0}")]
    Task(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] sessionkit_core::CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
