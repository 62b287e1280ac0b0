//! Affiliation status table

use crate::db::cache::{CacheRow, RowQuery};
use crate::error::SyncResult;
use orcache_common::db::AffiliationStatus;
use sqlx::SqlitePool;

impl CacheRow for AffiliationStatus {
    // (institution, person) is unique; the latest classification wins
    const INSERT_SQL: &'static str = r#"
        INSERT INTO affiliation_status (institution, person, is_managed, last_updated)
        VALUES (?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(institution, person) DO UPDATE SET
            is_managed = excluded.is_managed,
            last_updated = CURRENT_TIMESTAMP
    "#;

    fn bind_row<'q>(&'q self, query: RowQuery<'q>) -> RowQuery<'q> {
        query
            .bind(self.institution.as_str())
            .bind(self.person.as_str())
            .bind(self.is_managed)
    }
}

pub async fn list_for_institution(
    pool: &SqlitePool,
    institution: &str,
) -> SyncResult<Vec<AffiliationStatus>> {
    let rows = sqlx::query_as::<_, AffiliationStatus>(
        r#"
        SELECT institution, person, is_managed
        FROM affiliation_status
        WHERE institution = ?
        ORDER BY person
        "#,
    )
    .bind(institution)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
