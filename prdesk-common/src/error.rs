//! Shared error type for the prdesk crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure, including lock contention and constraint violations
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Root folder, config file or log file access
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or inconsistent bootstrap configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Job, query or setting that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected caller input (blank reviewer, assignment of a discarded query, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Broken internal invariant, such as an illegal job state transition
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the underlying database error is a UNIQUE constraint violation
    ///
    /// Concurrent deliveries of the same email or the same query surface this
    /// way; callers reclassify it instead of failing.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}
