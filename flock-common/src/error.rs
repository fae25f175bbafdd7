//! Common error types for Flock

use thiserror::Error;

/// Common result type for Flock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the library and the dashboard service
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
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

    /// Write rejected by a uniqueness rule or a state rule
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert a sqlx error, turning UNIQUE violations into `Conflict`
    ///
    /// `what` names the value that collided, e.g. "phone number".
    pub fn from_unique(err: sqlx::Error, what: &str) -> Self {
        if is_unique_violation(&err) {
            Error::Conflict(format!("{} already exists", what))
        } else {
            Error::Database(err)
        }
    }
}

/// True when the error is a SQLite UNIQUE / PRIMARY KEY constraint failure
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// True when the error is a SQLite FOREIGN KEY constraint failure
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_foreign_key_violation(),
        _ => false,
    }
}
