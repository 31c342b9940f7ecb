use thiserror::Error;
use xpost_core::{PostId, ValidationError};

/// Errors raised by the post store and attachment storage.
///
/// Nothing here is retried internally; callers decide.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Post not found: {id}")]
    PostNotFound { id: PostId },

    /// A stored value could not be decoded (e.g. malformed timestamp).
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Another thread panicked while holding the connection.
    #[error("Store connection lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
