//! Registry access token cache
//!
//! Client-credentials token shared by every request of the process. Refresh
//! is lazy: the first caller that finds the slot empty or expired requests a
//! new token while concurrent callers wait on the refresh lock and then reuse
//! the fresh value.

use crate::error::{SyncError, SyncResult};
use orcache_common::config::RegistryConfig;
use serde::Deserialize;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(15);
const TOKEN_SCOPE: &str = "/read-public";

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 6300;

/// Tokens are treated as expired this long before the server says so
pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Client credentials for the token endpoint
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl ClientCredentials {
    pub fn from_config(registry: &RegistryConfig) -> SyncResult<Self> {
        let client_id = non_blank(registry.client_id.as_deref())
            .ok_or_else(|| SyncError::Config("registry.client_id is not configured".into()))?;
        let client_secret = non_blank(registry.client_secret.as_deref())
            .ok_or_else(|| SyncError::Config("registry.client_secret is not configured".into()))?;
        let token_url = non_blank(Some(&registry.token_url))
            .ok_or_else(|| SyncError::Config("registry.token_url is not configured".into()))?;

        Ok(Self {
            client_id,
            client_secret,
            token_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct AuthToken {
    value: String,
    expires_at: Instant,
}

impl AuthToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Process-wide token cache
///
/// Construct once and share via `Arc`.
pub struct CredentialCache {
    http_client: reqwest::Client,
    credentials: ClientCredentials,
    slot: RwLock<Option<AuthToken>>,
    refresh_lock: Mutex<()>,
}

impl CredentialCache {
    pub fn new(http_client: reqwest::Client, credentials: ClientCredentials) -> Self {
        Self {
            http_client,
            credentials,
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Client id used to authenticate (trusted as an affiliation writer)
    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// Return a valid bearer token, requesting one if needed
    pub async fn get_token(&self) -> SyncResult<String> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(token);

        Ok(value)
    }

    /// Drop the cached token so the next call requests a new one
    ///
    /// Called by the fetcher when the registry rejects the token.
    pub fn invalidate(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("Registry token invalidated");
    }

    fn cached(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|t| t.is_valid())
            .map(|t| t.value.clone())
    }

    async fn request_token(&self) -> SyncResult<AuthToken> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", TOKEN_SCOPE),
        ];

        tracing::debug!(token_url = %self.credentials.token_url, "Requesting registry access token");

        let response = self
            .http_client
            .post(&self.credentials.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "Token endpoint rejected credentials");
            return Err(SyncError::Auth(format!(
                "Token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("Malformed token response: {}", e)))?;

        let value = payload
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SyncError::Auth("Token response carried no access_token".into()))?;

        let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        let expires_at = Instant::now() + lifetime.saturating_sub(EXPIRY_SAFETY_MARGIN);

        tracing::info!(
            lifetime_secs = lifetime.as_secs(),
            "Obtained registry access token"
        );

        Ok(AuthToken { value, expires_at })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
