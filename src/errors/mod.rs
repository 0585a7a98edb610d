// Custom error type and result alias for the API, built on thiserror.
use thiserror::Error;

pub mod response;

#[derive(Error, Debug)]
pub enum AppError {
    // Missing or malformed request fields (bad query params included)
    #[error("{0}")]
    Validation(String),

    // A path id that is not a valid document id
    #[error("{0}")]
    InvalidId(String),

    #[error("{0}")]
    NotFound(&'static str),

    // A write referenced a document that does not exist
    #[error("{0}")]
    Reference(String),

    // Unique-constraint violation reported by the store (duplicate email)
    #[error("{0}")]
    Conflict(String),

    // The #[from] attribute converts driver errors automatically
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

// Custom result type
pub type AppResult<T> = Result<T, AppError>;

/// True when a driver error is a duplicate-key write error (code 11000),
/// i.e. a unique-index violation such as a duplicate user email.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == 11000,
        ErrorKind::Command(ce) => ce.code == 11000,
        _ => false,
    }
}
