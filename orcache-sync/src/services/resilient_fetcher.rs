//! Resilient HTTP GET
//!
//! Wraps a single GET with the registry's status-code policy:
//!
//! | Status            | Action                                   |
//! |-------------------|------------------------------------------|
//! | 200               | return the response                      |
//! | 404               | return the response, never retried       |
//! | 401 / 403         | drop the shared token, give up (`None`)  |
//! | 429               | sleep `attempt * rate_limit_backoff`     |
//! | other / transport | sleep `attempt * transient_backoff`      |
//!
//! `None` is a soft, per-item failure; callers skip the item and continue.

use crate::error::{SyncError, SyncResult};
use crate::services::token_cache::CredentialCache;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use orcache_common::config::SyncConfig;
use orcache_common::time::millis_to_duration;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = concat!("orcache/", env!("CARGO_PKG_VERSION"));
const DEFAULT_ACCEPT: &str = "application/vnd.orcid+json";

/// Retry and backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request
    pub max_retries: u32,
    pub rate_limit_backoff: Duration,
    pub transient_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_backoff: Duration::from_secs(2),
            transient_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(sync: &SyncConfig) -> Self {
        Self {
            max_retries: sync.max_retries.max(1),
            rate_limit_backoff: millis_to_duration(sync.rate_limit_backoff_ms),
            transient_backoff: millis_to_duration(sync.transient_backoff_ms),
        }
    }
}

/// Fully read response
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub body: String,
}

impl FetchedResponse {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

enum AttemptOutcome {
    Done(FetchedResponse),
    Fatal,
    RateLimited,
    Transient(String),
}

/// Shared HTTP client for every registry call
pub fn build_http_client() -> SyncResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SyncError::HttpClient(e.to_string()))
}

/// Ensure an `Authorization` header carries the `Bearer ` scheme
pub fn normalize_authorization(headers: &mut HeaderMap) {
    let Some(raw) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return;
    };

    let trimmed = raw.trim();
    let has_scheme = trimmed
        .get(..7)
        .map(|scheme| scheme.eq_ignore_ascii_case("bearer "))
        .unwrap_or(false);
    if has_scheme {
        return;
    }

    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", trimmed)) {
        headers.insert(AUTHORIZATION, value);
    }
}

/// Header map carrying `Accept: application/json` and a bearer token
pub fn bearer_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(token.trim()) {
        headers.insert(AUTHORIZATION, value);
    }
    normalize_authorization(&mut headers);
    headers
}

/// GET with retry, backoff and optional request pacing
pub struct ResilientFetcher {
    http_client: reqwest::Client,
    policy: RetryPolicy,
    pacer: Option<DefaultDirectRateLimiter>,
    tokens: Option<Arc<CredentialCache>>,
}

impl ResilientFetcher {
    pub fn new(http_client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            http_client,
            policy,
            pacer: None,
            tokens: None,
        }
    }

    /// Invalidate `tokens` whenever the registry rejects a request with 401/403
    pub fn with_credential_cache(mut self, tokens: Arc<CredentialCache>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Limit outbound requests across all callers; 0 disables pacing
    pub fn with_requests_per_second(mut self, per_second: u32) -> Self {
        self.pacer = NonZeroU32::new(per_second).map(|n| RateLimiter::direct(Quota::per_second(n)));
        self
    }

    /// GET `url` using the configured attempt count
    pub async fn get(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Option<FetchedResponse> {
        self.get_with_retries(url, headers, timeout, self.policy.max_retries)
            .await
    }

    /// GET `url`, attempting at most `max_retries` times
    pub async fn get_with_retries(
        &self,
        url: &str,
        mut headers: HeaderMap,
        timeout: Duration,
        max_retries: u32,
    ) -> Option<FetchedResponse> {
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        }
        normalize_authorization(&mut headers);

        let attempts = max_retries.max(1);

        for attempt in 1..=attempts {
            let backoff = match self.attempt(url, &headers, timeout).await {
                AttemptOutcome::Done(response) => return Some(response),
                AttemptOutcome::Fatal => {
                    if let Some(tokens) = &self.tokens {
                        tokens.invalidate();
                    }
                    return None;
                }
                AttemptOutcome::RateLimited => {
                    let wait = self.policy.rate_limit_backoff * attempt;
                    tracing::warn!(
                        url = %url,
                        attempt,
                        attempts,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limit hit (429)"
                    );
                    wait
                }
                AttemptOutcome::Transient(reason) => {
                    tracing::warn!(url = %url, attempt, attempts, reason = %reason, "Request attempt failed");
                    self.policy.transient_backoff * attempt
                }
            };

            if attempt < attempts {
                tokio::time::sleep(backoff).await;
            }
        }

        tracing::error!(url = %url, attempts, "Giving up after exhausting retries");
        None
    }

    async fn attempt(&self, url: &str, headers: &HeaderMap, timeout: Duration) -> AttemptOutcome {
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }

        let response = match self
            .http_client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::Transient(e.to_string()),
        };

        let status = response.status();
        match status {
            StatusCode::OK | StatusCode::NOT_FOUND => match response.text().await {
                Ok(body) => AttemptOutcome::Done(FetchedResponse { status, body }),
                Err(e) => AttemptOutcome::Transient(format!("body read failed: {}", e)),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::error!(url = %url, status = status.as_u16(), "Authentication error");
                AttemptOutcome::Fatal
            }
            StatusCode::TOO_MANY_REQUESTS => AttemptOutcome::RateLimited,
            other => AttemptOutcome::Transient(format!("HTTP {}", other.as_u16())),
        }
    }
}
