//! Publication cache table

use crate::db::cache::{CacheRow, RowQuery};
use crate::error::SyncResult;
use orcache_common::db::PublicationRecord;
use sqlx::SqlitePool;

impl CacheRow for PublicationRecord {
    const INSERT_SQL: &'static str = r#"
        INSERT INTO publication_cache (
            institution, person, put_code, title, work_type, journal,
            pub_year, pub_month, pub_day, doi, issn, other_external_ids,
            source, visibility, url
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#;

    fn bind_row<'q>(&'q self, query: RowQuery<'q>) -> RowQuery<'q> {
        query
            .bind(self.institution.as_str())
            .bind(self.person.as_str())
            .bind(self.put_code)
            .bind(self.title.as_deref())
            .bind(self.work_type.as_deref())
            .bind(self.journal.as_deref())
            .bind(self.pub_date.year.as_deref())
            .bind(self.pub_date.month.as_deref())
            .bind(self.pub_date.day.as_deref())
            .bind(self.external_ids.doi.as_deref())
            .bind(self.external_ids.issn.as_deref())
            .bind(self.external_ids.other_joined())
            .bind(self.source.as_deref())
            .bind(self.visibility.as_deref())
            .bind(self.url.as_deref())
    }
}

/// Rows removed by [`purge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeCounts {
    pub publications: u64,
    pub affiliation_statuses: u64,
}

/// Delete the institution's publications and affiliation statuses
///
/// Both tables share one transaction and are committed immediately.
pub async fn purge(pool: &SqlitePool, institution: &str) -> SyncResult<PurgeCounts> {
    let mut tx = pool.begin().await?;

    let publications = sqlx::query("DELETE FROM publication_cache WHERE institution = ?")
        .bind(institution)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let affiliation_statuses = sqlx::query("DELETE FROM affiliation_status WHERE institution = ?")
        .bind(institution)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    Ok(PurgeCounts {
        publications,
        affiliation_statuses,
    })
}

pub async fn count(pool: &SqlitePool, institution: &str) -> SyncResult<i64> {
    let n = sqlx::query_scalar("SELECT COUNT(*) FROM publication_cache WHERE institution = ?")
        .bind(institution)
        .fetch_one(pool)
        .await?;
    Ok(n)
}
