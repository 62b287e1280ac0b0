//! orcache-sync library interface
//!
//! Synchronizes per-person registry records into the institution-scoped
//! SQLite cache. Exposes the engine for the `orcache-sync` binary and for
//! integration testing.

pub mod db;
pub mod error;
pub mod extractors;
pub mod services;

pub use crate::error::{SyncError, SyncResult};
pub use crate::services::{CacheRebuilder, RunOutcome};
