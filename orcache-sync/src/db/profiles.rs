//! Global profile summary table
//!
//! Rows are keyed by person only and are never purged.

use crate::db::cache::{CacheRow, RowQuery};
use crate::error::SyncResult;
use orcache_common::db::ProfileSummary;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

/// Keeps `IN (...)` lists well below SQLite's bound-parameter limit
const LOOKUP_CHUNK: usize = 500;

impl CacheRow for ProfileSummary {
    const INSERT_SQL: &'static str = r#"
        INSERT INTO profile_summary (person, given_names, family_name, credit_name, updated_at)
        VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(person) DO UPDATE SET
            given_names = excluded.given_names,
            family_name = excluded.family_name,
            credit_name = excluded.credit_name,
            updated_at = CURRENT_TIMESTAMP
    "#;

    fn bind_row<'q>(&'q self, query: RowQuery<'q>) -> RowQuery<'q> {
        query
            .bind(self.person.as_str())
            .bind(self.given_names.as_deref())
            .bind(self.family_name.as_deref())
            .bind(self.credit_name.as_deref())
    }
}

/// Everyone cached for the institution in either publications or grants
pub async fn persons_for_institution(
    pool: &SqlitePool,
    institution: &str,
) -> SyncResult<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT person FROM publication_cache WHERE institution = ?
        UNION
        SELECT person FROM grant_cache WHERE institution = ?
        ORDER BY person
        "#,
    )
    .bind(institution)
    .bind(institution)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|r| r.get("person")).collect())
}

/// Existing summaries for the given persons
pub async fn load_existing(
    pool: &SqlitePool,
    persons: &[String],
) -> SyncResult<HashMap<String, ProfileSummary>> {
    let mut existing = HashMap::with_capacity(persons.len());

    for chunk in persons.chunks(LOOKUP_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT person, given_names, family_name, credit_name FROM profile_summary WHERE person IN ({})",
            placeholders
        );

        let mut query = sqlx::query_as::<_, ProfileSummary>(&sql);
        for person in chunk {
            query = query.bind(person.as_str());
        }

        for row in query.fetch_all(pool).await? {
            existing.insert(row.person.clone(), row);
        }
    }

    Ok(existing)
}

pub async fn get(pool: &SqlitePool, person: &str) -> SyncResult<Option<ProfileSummary>> {
    let row = sqlx::query_as::<_, ProfileSummary>(
        "SELECT person, given_names, family_name, credit_name FROM profile_summary WHERE person = ?",
    )
    .bind(person)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
