//! Common error types for Calchart

use thiserror::Error;

/// Common result type for Calchart operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Calchart crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Uniqueness violation (duplicate show name, slug, username)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when a database error is a UNIQUE constraint violation
    #[cfg(feature = "sqlx")]
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => {
                db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}
