//! Common error types for orcache

use thiserror::Error;

/// Common result type for orcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration or opening the cache
#[derive(Error, Debug)]
pub enum Error {
    /// Schema creation or pool setup failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database directory could not be created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (unknown cache target, malformed identifier)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
