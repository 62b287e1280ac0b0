//! Error types for orcache-sync
//!
//! Only conditions that abort a whole invocation are represented here.
//! Not-found responses, rate limiting, transient network failures, per-person
//! fetch failures and dropped flush batches are absorbed where they occur.

use thiserror::Error;

/// Synchronization error type
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing credentials or endpoints; raised before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token endpoint rejected the client credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Profile document did not have the expected structure
    #[error("Unexpected document shape for {person}: {message}")]
    Transform { person: String, message: String },

    /// Purge, lookup or run-log write failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// orcache-common error
    #[error("Common error: {0}")]
    Common(#[from] orcache_common::Error),
}

impl SyncError {
    pub fn transform(person: &str, err: impl std::fmt::Display) -> Self {
        SyncError::Transform {
            person: person.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;
