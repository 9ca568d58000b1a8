//! Error types for storage operations.

use thiserror::Error;

/// Errors that can occur while reading or writing claim and player data.
#[derive(Debug, Error)]
pub enum Error {
    /// Native DB error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored record exists but cannot be interpreted.
    #[error("Corrupt record {record}: {reason}")]
    Corrupt { record: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn corrupt(record: impl Into<String>, reason: impl ToString) -> Self {
        Error::Corrupt {
            record: record.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<native_db::db_type::Error> for Error {
    fn from(err: native_db::db_type::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<ron::Error> for Error {
    fn from(err: ron::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;
