//! Cache rebuild orchestration
//!
//! Publications and grants are rebuilt by purge-and-replace:
//!
//! 1. Resolve the institution's legacy identifier
//! 2. Discover the affiliated population
//! 3. (publications) Build the trusted client id set
//! 4. Purge the institution's rows (committed immediately)
//! 5. Fetch every discovered profile concurrently
//! 6. Flatten profiles into rows and write them in bounded batches
//!
//! The profile directory sync instead upserts name summaries for everyone
//! already cached for the institution. Storage writes happen here only,
//! after all fetches for the run have completed.

use crate::db::{self, institutions, BatchWriter};
use crate::error::{SyncError, SyncResult};
use crate::extractors;
use crate::services::affiliation_classifier::{is_managed, trusted_ids};
use crate::services::identifier_healer::{sanitize_primary_id, IdentifierHealer, OrgRegistryClient};
use crate::services::profile_fetcher::ProfileFetcher;
use crate::services::registry_search::{person_ids, RegistrySearch};
use crate::services::resilient_fetcher::{build_http_client, ResilientFetcher, RetryPolicy};
use crate::services::token_cache::{ClientCredentials, CredentialCache};
use orcache_common::config::TomlConfig;
use orcache_common::db::{
    AffiliationStatus, CacheTarget, GrantRecord, ProfileSummary, PublicationRecord, RunStatus,
};
use orcache_common::time::millis_to_duration;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Affiliation status rows buffered before each write
pub const STATUS_FLUSH_BATCH: usize = 1000;

/// Result of one logged run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub institution: String,
    pub target: CacheTarget,
    pub status: RunStatus,
    pub row_count: i64,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }
}

#[derive(Debug, Clone, Copy)]
struct BatchSizes {
    rows: usize,
    statuses: usize,
    profiles: usize,
}

/// Rebuild pipeline over one shared token cache and fetcher
pub struct CacheRebuilder {
    pool: SqlitePool,
    tokens: Arc<CredentialCache>,
    search: RegistrySearch,
    profiles: ProfileFetcher,
    healer: IdentifierHealer,
    batches: BatchSizes,
}

impl CacheRebuilder {
    /// Wire every component from configuration
    ///
    /// Fails with [`SyncError::Config`] before any network call when the
    /// registry settings are incomplete.
    pub fn from_config(pool: SqlitePool, config: &TomlConfig) -> SyncResult<Self> {
        config.validate_credentials().map_err(|e| match e {
            orcache_common::Error::Config(msg) => SyncError::Config(msg),
            other => SyncError::Common(other),
        })?;

        let credentials = ClientCredentials::from_config(&config.registry)?;
        let http_client = build_http_client()?;
        let sync = &config.sync;

        let tokens = Arc::new(CredentialCache::new(http_client.clone(), credentials));
        let fetcher = Arc::new(
            ResilientFetcher::new(http_client.clone(), RetryPolicy::from_config(sync))
                .with_requests_per_second(sync.requests_per_second)
                .with_credential_cache(Arc::clone(&tokens)),
        );

        let search = RegistrySearch::new(
            Arc::clone(&fetcher),
            Arc::clone(&tokens),
            config.registry.search_url.as_str(),
        )
        .with_page_size(sync.page_size)
        .with_page_delay(millis_to_duration(sync.page_delay_ms));

        let profiles = ProfileFetcher::new(
            fetcher,
            Arc::clone(&tokens),
            config.registry.member_url.as_str(),
        )
        .with_concurrency(sync.concurrency);

        let healer = IdentifierHealer::new(
            pool.clone(),
            OrgRegistryClient::new(http_client, config.org_registry.base_url.as_str()),
        );

        Ok(Self {
            pool,
            tokens,
            search,
            profiles,
            healer,
            batches: BatchSizes {
                rows: sync.flush_batch.max(1),
                statuses: STATUS_FLUSH_BATCH,
                profiles: sync.profile_commit_batch.max(1),
            },
        })
    }

    /// Replace the institution's publications and affiliation statuses
    ///
    /// Returns the number of publication rows committed.
    pub async fn rebuild_publications(&self, institution: &str) -> SyncResult<u64> {
        let institution = institution.trim();
        let ids = self.discover(institution).await?;
        if ids.is_empty() {
            tracing::info!(institution = %institution, "No affiliated persons found; cache left as is");
            return Ok(0);
        }

        let manager = institutions::find_manager_client_id(&self.pool, institution).await?;
        let trusted = trusted_ids(self.tokens.client_id(), manager.as_deref());
        if let Some(manager) = &manager {
            tracing::info!(institution = %institution, manager_client = %manager, "Institution manager client trusted");
        }

        let purged = db::publications::purge(&self.pool, institution).await?;
        tracing::info!(
            institution = %institution,
            publications = purged.publications,
            statuses = purged.affiliation_statuses,
            "Purged publication cache"
        );

        let profiles = self.profiles.fetch_all(&ids).await?;

        let mut rows =
            BatchWriter::<PublicationRecord>::new(&self.pool, "publication_cache", self.batches.rows);
        let mut statuses =
            BatchWriter::<AffiliationStatus>::new(&self.pool, "affiliation_status", self.batches.statuses);

        for person in &ids {
            let Some(profile) = profiles.get(person) else {
                continue;
            };

            statuses
                .push(AffiliationStatus {
                    institution: institution.to_string(),
                    person: person.clone(),
                    is_managed: is_managed(profile, &trusted),
                })
                .await;

            rows.extend(extractors::publications::extract(institution, person, profile)?)
                .await;
        }

        let statuses = statuses.finish().await;
        let written = rows.finish().await;

        tracing::info!(
            institution = %institution,
            rows = written.committed,
            dropped = written.dropped,
            statuses = statuses.committed,
            profiles = profiles.len(),
            "Publication cache rebuilt"
        );

        Ok(written.committed)
    }

    /// Replace the institution's grants
    ///
    /// Returns the number of grant rows committed.
    pub async fn rebuild_grants(&self, institution: &str) -> SyncResult<u64> {
        let institution = institution.trim();
        let ids = self.discover(institution).await?;
        if ids.is_empty() {
            tracing::info!(institution = %institution, "No affiliated persons found; cache left as is");
            return Ok(0);
        }

        let purged = db::grants::purge(&self.pool, institution).await?;
        tracing::info!(institution = %institution, grants = purged, "Purged grant cache");

        let profiles = self.profiles.fetch_all(&ids).await?;

        let mut rows = BatchWriter::<GrantRecord>::new(&self.pool, "grant_cache", self.batches.rows);

        for person in &ids {
            let Some(profile) = profiles.get(person) else {
                continue;
            };
            rows.extend(extractors::grants::extract(institution, person, profile)?)
                .await;
        }

        let written = rows.finish().await;

        tracing::info!(
            institution = %institution,
            rows = written.committed,
            dropped = written.dropped,
            profiles = profiles.len(),
            "Grant cache rebuilt"
        );

        Ok(written.committed)
    }

    /// Refresh name summaries for everyone cached for the institution
    ///
    /// Summaries already up to date are not rewritten but still count as
    /// synchronized.
    pub async fn sync_profile_directory(&self, institution: &str) -> SyncResult<u64> {
        let institution = institution.trim();
        let persons = db::profiles::persons_for_institution(&self.pool, institution).await?;
        if persons.is_empty() {
            tracing::info!(institution = %institution, "No cached persons; nothing to sync");
            return Ok(0);
        }

        let fetched = self.profiles.fetch_all(&persons).await?;
        let existing = db::profiles::load_existing(&self.pool, &persons).await?;

        let mut writer =
            BatchWriter::<ProfileSummary>::new(&self.pool, "profile_summary", self.batches.profiles);
        let mut unchanged = 0u64;

        for person in &persons {
            let Some(profile) = fetched.get(person) else {
                continue;
            };

            let summary = extractors::profiles::extract(person, profile)?;
            if existing.get(person) == Some(&summary) {
                unchanged += 1;
                continue;
            }
            writer.push(summary).await;
        }

        let written = writer.finish().await;
        let synced = unchanged + written.committed;

        tracing::info!(
            institution = %institution,
            synced,
            unchanged,
            dropped = written.dropped,
            "Profile directory synchronized"
        );

        Ok(synced)
    }

    /// Run one target without logging it
    pub async fn run(&self, institution: &str, target: CacheTarget) -> SyncResult<u64> {
        match target {
            CacheTarget::Publications => self.rebuild_publications(institution).await,
            CacheTarget::Grants => self.rebuild_grants(institution).await,
            CacheTarget::Profiles => self.sync_profile_directory(institution).await,
        }
    }

    /// Run one target under a run log entry
    ///
    /// A failed run is recorded with its error text and a row count of
    /// zero. Only a failure to open the log entry is returned as an error.
    pub async fn run_logged(&self, institution: &str, target: CacheTarget) -> SyncResult<RunOutcome> {
        let institution = institution.trim();
        let run_id = db::run_log::open_run(&self.pool, institution, target).await?;

        tracing::info!(institution = %institution, target = %target, run_id = %run_id, "Run started");

        let (status, row_count, error) = match self.run(institution, target).await {
            Ok(rows) => (RunStatus::Success, rows as i64, None),
            Err(e) => {
                tracing::error!(institution = %institution, target = %target, error = %e, "Run failed");
                (RunStatus::Failed, 0, Some(e.to_string()))
            }
        };

        if let Err(e) =
            db::run_log::close_run(&self.pool, run_id, status, row_count, error.as_deref()).await
        {
            tracing::warn!(run_id = %run_id, error = %e, "Could not close run log entry");
        }

        tracing::info!(
            institution = %institution,
            target = %target,
            status = status.as_str(),
            rows = row_count,
            "Run finished"
        );

        Ok(RunOutcome {
            run_id,
            institution: institution.to_string(),
            target,
            status,
            row_count,
            error,
        })
    }

    /// Run `targets` for every registered institution
    ///
    /// Each institution and target gets its own run log entry; a failed run
    /// does not stop the remaining ones.
    pub async fn rebuild_all(&self, targets: &[CacheTarget]) -> SyncResult<Vec<RunOutcome>> {
        let institutions = institutions::list_primary_ids(&self.pool).await?;
        tracing::info!(institutions = institutions.len(), "Rebuilding all institutions");

        let mut outcomes = Vec::with_capacity(institutions.len() * targets.len());
        for (index, institution) in institutions.iter().enumerate() {
            tracing::info!(
                institution = %institution,
                progress = format!("{}/{}", index + 1, institutions.len()),
                "Processing institution"
            );
            for &target in targets {
                outcomes.push(self.run_logged(institution, target).await?);
            }
        }

        Ok(outcomes)
    }

    /// Legacy id (healed if needed) and the deduplicated population
    async fn discover(&self, institution: &str) -> SyncResult<Vec<String>> {
        let legacy_id = self.healer.ensure_legacy_id(institution).await?;
        let code = sanitize_primary_id(institution);

        let hits = self
            .search
            .search(code.as_deref(), legacy_id.as_deref())
            .await?;
        let ids = person_ids(&hits);

        tracing::info!(
            institution = %institution,
            legacy_id = legacy_id.as_deref().unwrap_or("-"),
            persons = ids.len(),
            "Population discovered"
        );

        Ok(ids)
    }
}
