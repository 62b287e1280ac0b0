//! Grant cache table

use crate::db::cache::{CacheRow, RowQuery};
use crate::error::SyncResult;
use orcache_common::db::GrantRecord;
use sqlx::SqlitePool;

impl CacheRow for GrantRecord {
    const INSERT_SQL: &'static str = r#"
        INSERT INTO grant_cache (
            institution, person, title, grant_type, org_name, city, country,
            start_year, start_month, start_day, end_year, end_month, end_day,
            grant_number, currency, amount, source, visibility, url
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#;

    fn bind_row<'q>(&'q self, query: RowQuery<'q>) -> RowQuery<'q> {
        query
            .bind(self.institution.as_str())
            .bind(self.person.as_str())
            .bind(self.title.as_deref())
            .bind(self.grant_type.as_deref())
            .bind(self.org_name.as_deref())
            .bind(self.address.city.as_deref())
            .bind(self.address.country.as_deref())
            .bind(self.start_date.year.as_deref())
            .bind(self.start_date.month.as_deref())
            .bind(self.start_date.day.as_deref())
            .bind(self.end_date.year.as_deref())
            .bind(self.end_date.month.as_deref())
            .bind(self.end_date.day.as_deref())
            .bind(self.grant_number.as_deref())
            .bind(self.currency.as_deref())
            .bind(self.amount.as_deref())
            .bind(self.source.as_deref())
            .bind(self.visibility.as_deref())
            .bind(self.url.as_deref())
    }
}

/// Delete the institution's grants; committed immediately
pub async fn purge(pool: &SqlitePool, institution: &str) -> SyncResult<u64> {
    let mut tx = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM grant_cache WHERE institution = ?")
        .bind(institution)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    Ok(deleted)
}
