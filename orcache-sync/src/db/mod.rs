//! Cache storage access
//!
//! Free async functions over the shared SQLite pool. Writers run on the
//! orchestrating task only, after fetches complete.

pub mod affiliation;
pub mod cache;
pub mod grants;
pub mod institutions;
pub mod profiles;
pub mod publications;
pub mod run_log;

pub use cache::{insert_batch, BatchWriter, CacheRow};
