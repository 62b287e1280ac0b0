//! Legacy institution identifier resolution
//!
//! Some registry queries still need an institution's older identifier. It is
//! taken from local accounts when any of them already carries it, otherwise
//! resolved through the organization registry and written back onto every
//! account of the institution that lacks it.
//!
//! The organization registry has served `external_ids` in two shapes:
//!
//! ```text
//! [{"type": "grid", "preferred": "grid.1.0", "all": ["grid.1.0"]}]   (list)
//! {"GRID": {"preferred": "grid.1.0", "all": ["grid.1.0"]}}           (map)
//! ```

use crate::db::institutions;
use crate::error::SyncResult;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::time::Duration;

const ORG_REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);
const ORG_URL_PREFIX: &str = "https://ror.org/";

/// Bare institution code from a code or an `https://ror.org/<code>` URL
pub fn sanitize_primary_id(raw: &str) -> Option<String> {
    raw.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

/// `preferred`, else the first entry of `all`
pub fn preferred_or_first(entry: &Value) -> Option<String> {
    let preferred = entry
        .get("preferred")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());

    preferred
        .or_else(|| {
            entry
                .get("all")
                .and_then(Value::as_array)
                .and_then(|all| all.first())
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .map(str::to_string)
}

/// List shape: entries tagged with `"type": "grid"`
pub fn from_typed_list(entries: &[Value]) -> Option<String> {
    entries
        .iter()
        .find(|e| e.get("type").and_then(Value::as_str) == Some("grid"))
        .and_then(preferred_or_first)
}

/// Map shape: entry under the `GRID` key
pub fn from_type_map(entries: &Map<String, Value>) -> Option<String> {
    entries.get("GRID").and_then(preferred_or_first)
}

/// Legacy id from an organization document, whichever shape it uses
pub fn decode_legacy_id(document: &Value) -> Option<String> {
    match document.get("external_ids")? {
        Value::Array(entries) => from_typed_list(entries),
        Value::Object(entries) => from_type_map(entries),
        _ => None,
    }
}

/// Organization registry lookups
pub struct OrgRegistryClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OrgRegistryClient {
    pub fn new(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    /// Legacy id for an institution; `None` on any failure
    pub async fn lookup_legacy_id(&self, primary_id: &str) -> Option<String> {
        let code = sanitize_primary_id(primary_id)?;
        let url = format!(
            "{}/organizations/{}{}",
            self.base_url.trim_end_matches('/'),
            ORG_URL_PREFIX,
            code
        );

        let response = match self
            .http_client
            .get(&url)
            .header(ACCEPT, "application/json")
            .timeout(ORG_REGISTRY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(institution = %code, error = %e, "Organization registry unreachable");
                return None;
            }
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                tracing::info!(institution = %code, "Institution not found in organization registry");
                return None;
            }
            other => {
                tracing::warn!(
                    institution = %code,
                    status = other.as_u16(),
                    "Unexpected organization registry status"
                );
                return None;
            }
        }

        match response.json::<Value>().await {
            Ok(document) => decode_legacy_id(&document),
            Err(e) => {
                tracing::error!(institution = %code, error = %e, "Unparseable organization document");
                None
            }
        }
    }
}

/// Local-first legacy id resolution with write-back
pub struct IdentifierHealer {
    pool: SqlitePool,
    registry: OrgRegistryClient,
}

impl IdentifierHealer {
    pub fn new(pool: SqlitePool, registry: OrgRegistryClient) -> Self {
        Self { pool, registry }
    }

    /// Legacy id for `primary_id`, or `None` when it cannot be resolved
    ///
    /// Only a failed local lookup is an error. A failed write-back is logged
    /// and the resolved id is still returned.
    pub async fn ensure_legacy_id(&self, primary_id: &str) -> SyncResult<Option<String>> {
        if primary_id.trim().is_empty() {
            return Ok(None);
        }

        let legacy_id = match institutions::find_legacy_id(&self.pool, primary_id).await? {
            Some(known) => known,
            None => match self.registry.lookup_legacy_id(primary_id).await {
                Some(resolved) => resolved,
                None => return Ok(None),
            },
        };

        match institutions::backfill_legacy_id(&self.pool, primary_id, &legacy_id).await {
            Ok(0) => {}
            Ok(updated) => {
                tracing::info!(
                    institution = %primary_id,
                    legacy_id = %legacy_id,
                    accounts = updated,
                    "Back-filled legacy identifier"
                );
            }
            Err(e) => {
                tracing::error!(institution = %primary_id, error = %e, "Legacy identifier back-fill failed");
            }
        }

        Ok(Some(legacy_id))
    }
}
