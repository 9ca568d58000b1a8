//! Error types for landclaim-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Invalid permission level: {0}")]
    InvalidPermission(String),

    #[error("Invalid player id: {0}")]
    InvalidPlayerId(#[from] uuid::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
