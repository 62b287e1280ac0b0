//! Institution population discovery
//!
//! Pages through the registry's expanded search for every person affiliated
//! with an institution, matching on the primary and/or legacy identifier.

use crate::error::SyncResult;
use crate::services::resilient_fetcher::{bearer_headers, ResilientFetcher};
use crate::services::token_cache::CredentialCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One expanded-search result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "orcid-id")]
    pub person_id: Option<String>,
    #[serde(rename = "given-names", default)]
    pub given_names: Option<String>,
    #[serde(rename = "family-names", default)]
    pub family_names: Option<String>,
    #[serde(rename = "institution-name", default)]
    pub institution_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(rename = "expanded-result", default)]
    expanded_result: Option<Vec<SearchHit>>,
}

/// Boolean query over whichever identifiers are present
pub fn build_query(primary_id: Option<&str>, legacy_id: Option<&str>) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(primary) = present(primary_id) {
        parts.push(format!("ror-org-id:\"https://ror.org/{}\"", primary));
    }
    if let Some(legacy) = present(legacy_id) {
        parts.push(format!("grid-org-id:\"{}\"", legacy));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" OR "))
    }
}

/// Insertion-ordered, keyed by person id
///
/// A repeated id keeps its first position and takes the latest content.
#[derive(Debug, Default)]
pub struct Population {
    hits: Vec<SearchHit>,
    index: HashMap<String, usize>,
}

impl Population {
    pub fn insert(&mut self, hit: SearchHit) {
        let Some(id) = present(hit.person_id.as_deref()).map(str::to_string) else {
            return;
        };

        match self.index.get(&id) {
            Some(&pos) => self.hits[pos] = hit,
            None => {
                self.index.insert(id, self.hits.len());
                self.hits.push(hit);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn into_hits(self) -> Vec<SearchHit> {
        self.hits
    }
}

/// Person ids of a search result, in discovery order
pub fn person_ids(hits: &[SearchHit]) -> Vec<String> {
    hits.iter()
        .filter_map(|h| present(h.person_id.as_deref()))
        .map(str::to_string)
        .collect()
}

/// Paginated expanded-search client
pub struct RegistrySearch {
    fetcher: Arc<ResilientFetcher>,
    tokens: Arc<CredentialCache>,
    search_url: String,
    page_size: usize,
    page_delay: Duration,
}

impl RegistrySearch {
    pub fn new(
        fetcher: Arc<ResilientFetcher>,
        tokens: Arc<CredentialCache>,
        search_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            tokens,
            search_url: search_url.into(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::ZERO,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Unique population affiliated with the institution
    ///
    /// A failed page ends pagination and returns what was gathered so far.
    /// Only a token failure is reported as an error.
    pub async fn search(
        &self,
        primary_id: Option<&str>,
        legacy_id: Option<&str>,
    ) -> SyncResult<Vec<SearchHit>> {
        let Some(query) = build_query(primary_id, legacy_id) else {
            tracing::warn!("Search skipped: no primary or legacy identifier");
            return Ok(Vec::new());
        };

        let token = self.tokens.get_token().await?;
        let endpoint = format!("{}/expanded-search/", self.search_url.trim_end_matches('/'));

        tracing::info!(query = %query, "Executing institution search");

        let mut population = Population::default();
        let mut start = 0usize;

        loop {
            let Some(chunk) = self.fetch_page(&endpoint, &query, start, &token).await else {
                tracing::error!(start, "Search page failed; keeping partial results");
                break;
            };

            let received = chunk.len();
            for hit in chunk {
                population.insert(hit);
            }

            if received < self.page_size {
                break;
            }

            start += self.page_size;

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        tracing::info!(unique = population.len(), "Search completed");
        Ok(population.into_hits())
    }

    async fn fetch_page(
        &self,
        endpoint: &str,
        query: &str,
        start: usize,
        token: &str,
    ) -> Option<Vec<SearchHit>> {
        let url = reqwest::Url::parse_with_params(
            endpoint,
            &[
                ("q", query.to_string()),
                ("start", start.to_string()),
                ("rows", self.page_size.to_string()),
            ],
        )
        .map_err(|e| tracing::error!(endpoint = %endpoint, error = %e, "Invalid search URL"))
        .ok()?;

        let response = self
            .fetcher
            .get(url.as_str(), bearer_headers(token), SEARCH_TIMEOUT)
            .await?;

        if !response.is_ok() {
            tracing::warn!(status = response.status.as_u16(), start, "Search page not available");
            return None;
        }

        match response.json::<SearchPage>() {
            Ok(page) => Some(page.expanded_result.unwrap_or_default()),
            Err(e) => {
                tracing::error!(start, error = %e, "Unparseable search page");
                None
            }
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
