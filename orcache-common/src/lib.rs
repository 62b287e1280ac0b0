//! # orcache common library
//!
//! Shared code for the orcache workspace:
//! - Error type
//! - TOML configuration loading
//! - SQLite initialization and cache table schema
//! - Row models read by the synchronization engine and by report readers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
