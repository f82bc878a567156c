//! Error types for matoswim-store.

use std::path::PathBuf;

/// Result type for matoswim-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in matoswim-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}
