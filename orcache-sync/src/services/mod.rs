//! Synchronization engine components
//!
//! Dependency order, leaves first:
//! - `token_cache` - shared bearer token with lazy refresh
//! - `resilient_fetcher` - one GET with retry, backoff and pacing
//! - `registry_search` - paginated population discovery
//! - `identifier_healer` - legacy institution id resolution
//! - `profile_fetcher` - bounded concurrent profile fetching
//! - `affiliation_classifier` - trusted-source detection
//! - `cache_rebuilder` - purge-and-rebuild pipelines

pub mod affiliation_classifier;
pub mod cache_rebuilder;
pub mod identifier_healer;
pub mod profile_fetcher;
pub mod registry_search;
pub mod resilient_fetcher;
pub mod token_cache;

pub use cache_rebuilder::{CacheRebuilder, RunOutcome};
pub use identifier_healer::{IdentifierHealer, OrgRegistryClient};
pub use profile_fetcher::ProfileFetcher;
pub use registry_search::{RegistrySearch, SearchHit};
pub use resilient_fetcher::{FetchedResponse, ResilientFetcher, RetryPolicy};
pub use token_cache::{ClientCredentials, CredentialCache};
