//! Concurrent profile fetching
//!
//! Maps person ids to full profile documents through a bounded pool of
//! in-flight requests (`buffer_unordered`). The token and endpoint are
//! resolved once before dispatch; each worker only carries its id, the
//! shared fetcher and the prepared headers.

use crate::error::SyncResult;
use crate::extractors::{ACTIVITIES_KEY, LEGACY_ACTIVITIES_KEY};
use crate::services::resilient_fetcher::{bearer_headers, ResilientFetcher};
use crate::services::token_cache::CredentialCache;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PROFILE_TIMEOUT: Duration = Duration::from_secs(20);
const PROGRESS_EVERY: usize = 25;

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Rename `activities-summary` to the canonical `activities` key
pub fn normalize_profile(mut profile: Value) -> Value {
    if let Some(map) = profile.as_object_mut() {
        if !map.contains_key(ACTIVITIES_KEY) {
            if let Some(summary) = map.remove(LEGACY_ACTIVITIES_KEY) {
                map.insert(ACTIVITIES_KEY.to_string(), summary);
            }
        }
    }
    profile
}

/// Bounded worker pool over the profile endpoint
pub struct ProfileFetcher {
    fetcher: Arc<ResilientFetcher>,
    tokens: Arc<CredentialCache>,
    member_url: String,
    concurrency: usize,
}

impl ProfileFetcher {
    pub fn new(
        fetcher: Arc<ResilientFetcher>,
        tokens: Arc<CredentialCache>,
        member_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            tokens,
            member_url: member_url.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Profiles for `ids`; ids whose fetch fails are absent from the map
    ///
    /// Returns once every id has been attempted. Only a token failure is
    /// reported as an error.
    pub async fn fetch_all(&self, ids: &[String]) -> SyncResult<HashMap<String, Value>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let token = self.tokens.get_token().await?;
        let headers = bearer_headers(&token);
        let base = self.member_url.trim_end_matches('/').to_string();
        let total = ids.len();
        let completed = Arc::new(AtomicUsize::new(0));

        tracing::info!(total, workers = self.concurrency, "Fetching profiles");

        let results: Vec<Option<(String, Value)>> = stream::iter(ids.iter().cloned())
            .map(|person| {
                let fetcher = Arc::clone(&self.fetcher);
                let headers = headers.clone();
                let url = format!("{}/{}/record", base, person);
                let completed = Arc::clone(&completed);

                async move {
                    let profile = fetch_one(&fetcher, &person, &url, headers).await;

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % PROGRESS_EVERY == 0 || done == total {
                        tracing::info!(progress = format!("{}/{}", done, total), "Profile fetch progress");
                    }

                    profile.map(|p| (person, p))
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let profiles: HashMap<String, Value> = results.into_iter().flatten().collect();

        tracing::info!(
            requested = total,
            fetched = profiles.len(),
            failed = total - profiles.len(),
            "Profile fetch completed"
        );

        Ok(profiles)
    }
}

async fn fetch_one(
    fetcher: &ResilientFetcher,
    person: &str,
    url: &str,
    headers: reqwest::header::HeaderMap,
) -> Option<Value> {
    let response = fetcher.get(url, headers, PROFILE_TIMEOUT).await?;

    if !response.is_ok() {
        tracing::debug!(person = %person, status = response.status.as_u16(), "Profile not available");
        return None;
    }

    match response.json::<Value>() {
        Ok(profile) if profile.as_object().is_some_and(|m| !m.is_empty()) => {
            Some(normalize_profile(profile))
        }
        Ok(_) => {
            tracing::debug!(person = %person, "Empty profile document");
            None
        }
        Err(e) => {
            tracing::warn!(person = %person, error = %e, "Unparseable profile document");
            None
        }
    }
}
