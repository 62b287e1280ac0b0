//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Entity type a cache run rebuilds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTarget {
    Publications,
    Grants,
    /// Profile directory (global name cache)
    Profiles,
}

impl CacheTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTarget::Publications => "publications",
            CacheTarget::Grants => "grants",
            CacheTarget::Profiles => "profiles",
        }
    }
}

impl fmt::Display for CacheTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheTarget {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publications" | "works" => Ok(CacheTarget::Publications),
            "grants" | "fundings" => Ok(CacheTarget::Grants),
            "profiles" => Ok(CacheTarget::Profiles),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown cache target '{}'",
                other
            ))),
        }
    }
}

/// Outcome recorded in `cache_run_log.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown run status '{}'",
                other
            ))),
        }
    }
}

/// One locally registered account scoped to an institution
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InstitutionAccount {
    pub id: i64,
    pub account_name: String,
    pub institution_name: Option<String>,
    /// Modern registry code (e.g. `02ap3w078`)
    pub primary_id: Option<String>,
    /// Older code some search queries still need; healed lazily
    pub legacy_id: Option<String>,
    /// API client this institution uses to write affiliations
    pub manager_client_id: Option<String>,
}

/// Year / month / day as published upstream (each part optional)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDate {
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub doi: Option<String>,
    pub issn: Option<String>,
    /// Remaining identifiers as `type:value`
    pub other: Vec<String>,
}

impl ExternalIds {
    /// Storage form of `other` (`None` when empty)
    pub fn other_joined(&self) -> Option<String> {
        if self.other.is_empty() {
            None
        } else {
            Some(self.other.join("; "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub institution: String,
    pub person: String,
    pub put_code: Option<i64>,
    pub title: Option<String>,
    pub work_type: Option<String>,
    pub external_ids: ExternalIds,
    pub journal: Option<String>,
    pub pub_date: PartialDate,
    pub source: Option<String>,
    pub visibility: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub institution: String,
    pub person: String,
    pub title: Option<String>,
    pub grant_type: Option<String>,
    pub org_name: Option<String>,
    pub address: Address,
    pub start_date: PartialDate,
    pub end_date: PartialDate,
    pub grant_number: Option<String>,
    pub currency: Option<String>,
    pub amount: Option<String>,
    pub source: Option<String>,
    pub visibility: Option<String>,
    pub url: Option<String>,
}

/// Whether a person's affiliations were written by a trusted client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AffiliationStatus {
    pub institution: String,
    pub person: String,
    pub is_managed: bool,
}

/// Global name cache entry, keyed by person only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfileSummary {
    pub person: String,
    pub given_names: Option<String>,
    pub family_name: Option<String>,
    pub credit_name: Option<String>,
}

/// Audit row for one rebuild invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRunLog {
    pub run_id: Uuid,
    pub institution: String,
    pub target: CacheTarget,
    pub status: RunStatus,
    pub row_count: i64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
