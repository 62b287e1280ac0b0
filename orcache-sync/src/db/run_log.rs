//! Cache run audit log
//!
//! One row per invocation: opened as `running`, closed with the outcome.

use crate::error::{SyncError, SyncResult};
use orcache_common::db::{CacheRunLog, CacheTarget, RunStatus};
use orcache_common::time::{now, parse_timestamp};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Record the start of a run
pub async fn open_run(
    pool: &SqlitePool,
    institution: &str,
    target: CacheTarget,
) -> SyncResult<Uuid> {
    let run_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO cache_run_log (run_id, institution, target, status, row_count, started_at)
        VALUES (?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(run_id.to_string())
    .bind(institution)
    .bind(target.as_str())
    .bind(RunStatus::Running.as_str())
    .bind(now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(run_id)
}

/// Record the outcome and finish time of a run
pub async fn close_run(
    pool: &SqlitePool,
    run_id: Uuid,
    status: RunStatus,
    row_count: i64,
    error: Option<&str>,
) -> SyncResult<()> {
    sqlx::query(
        r#"
        UPDATE cache_run_log
        SET status = ?, row_count = ?, error = ?, finished_at = ?
        WHERE run_id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(row_count)
    .bind(error)
    .bind(now().to_rfc3339())
    .bind(run_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Runs for an institution, oldest first
pub async fn list_runs(pool: &SqlitePool, institution: &str) -> SyncResult<Vec<CacheRunLog>> {
    let rows = sqlx::query(
        r#"
        SELECT run_id, institution, target, status, row_count, error, started_at, finished_at
        FROM cache_run_log
        WHERE institution = ?
        ORDER BY id
        "#,
    )
    .bind(institution)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let run_id: String = row.get("run_id");
            let target: String = row.get("target");
            let status: String = row.get("status");
            let started_at: String = row.get("started_at");
            let finished_at: Option<String> = row.get("finished_at");

            Ok(CacheRunLog {
                run_id: Uuid::parse_str(&run_id).map_err(|e| {
                    SyncError::Common(orcache_common::Error::InvalidInput(format!(
                        "Bad run id '{}': {}",
                        run_id, e
                    )))
                })?,
                institution: row.get("institution"),
                target: target.parse()?,
                status: status.parse()?,
                row_count: row.get("row_count"),
                error: row.get("error"),
                started_at: parse_timestamp(&started_at)?,
                finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
            })
        })
        .collect()
}
