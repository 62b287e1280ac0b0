//! Institution account lookups
//!
//! Several local accounts may point at the same institution (`primary_id`).
//! Institution ids are compared trimmed on both sides.

use crate::error::SyncResult;
use sqlx::{Row, SqlitePool};

/// Legacy id already known for the institution, if any account carries one
pub async fn find_legacy_id(pool: &SqlitePool, primary_id: &str) -> SyncResult<Option<String>> {
    let row = sqlx::query(
        r#"
        SELECT legacy_id
        FROM institution_accounts
        WHERE TRIM(primary_id) = ?
          AND legacy_id IS NOT NULL
          AND TRIM(legacy_id) != ''
        LIMIT 1
        "#,
    )
    .bind(primary_id.trim())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.get::<String, _>("legacy_id")))
}

/// Store the legacy id on every account of the institution still missing it
///
/// Returns the number of accounts updated. Existing values are never
/// overwritten.
pub async fn backfill_legacy_id(
    pool: &SqlitePool,
    primary_id: &str,
    legacy_id: &str,
) -> SyncResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE institution_accounts
        SET legacy_id = ?
        WHERE TRIM(primary_id) = ?
          AND (legacy_id IS NULL OR TRIM(legacy_id) = '')
        "#,
    )
    .bind(legacy_id)
    .bind(primary_id.trim())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Manager client id configured for the institution
pub async fn find_manager_client_id(
    pool: &SqlitePool,
    primary_id: &str,
) -> SyncResult<Option<String>> {
    let row = sqlx::query(
        r#"
        SELECT manager_client_id
        FROM institution_accounts
        WHERE TRIM(primary_id) = ?
          AND manager_client_id IS NOT NULL
          AND TRIM(manager_client_id) != ''
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(primary_id.trim())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.get::<String, _>("manager_client_id")))
}

/// Distinct non-empty institution ids, sorted
pub async fn list_primary_ids(pool: &SqlitePool) -> SyncResult<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT TRIM(primary_id) AS primary_id
        FROM institution_accounts
        WHERE primary_id IS NOT NULL AND TRIM(primary_id) != ''
        ORDER BY 1
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|r| r.get("primary_id")).collect())
}

/// Register a local account (used by setup tooling and tests)
pub async fn insert_account(
    pool: &SqlitePool,
    account_name: &str,
    primary_id: Option<&str>,
    legacy_id: Option<&str>,
    manager_client_id: Option<&str>,
) -> SyncResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO institution_accounts (account_name, primary_id, legacy_id, manager_client_id)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(account_name)
    .bind(primary_id.map(str::trim))
    .bind(legacy_id)
    .bind(manager_client_id)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcache_common::db::init_memory_database;

    #[tokio::test]
    async fn test_backfill_only_touches_missing_values() {
        let pool = init_memory_database().await.unwrap();
        insert_account(&pool, "lib-a", Some("05abc"), None, None).await.unwrap();
        insert_account(&pool, "lib-b", Some("05abc"), Some(""), None).await.unwrap();
        insert_account(&pool, "lib-c", Some("05abc"), Some("grid.9.9"), None).await.unwrap();
        insert_account(&pool, "other", Some("07xyz"), None, None).await.unwrap();

        let updated = backfill_legacy_id(&pool, "05abc", "grid.1.1").await.unwrap();
        assert_eq!(updated, 2);

        let kept: String =
            sqlx::query_scalar("SELECT legacy_id FROM institution_accounts WHERE account_name = 'lib-c'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(kept, "grid.9.9");

        let untouched: Option<String> =
            sqlx::query_scalar("SELECT legacy_id FROM institution_accounts WHERE account_name = 'other'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(untouched.is_none());

        // Second run has nothing left to fill
        assert_eq!(backfill_legacy_id(&pool, "05abc", "grid.1.1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lookups_ignore_blank_values() {
        let pool = init_memory_database().await.unwrap();
        insert_account(&pool, "a", Some("05abc"), Some("  "), Some("")).await.unwrap();
        assert_eq!(find_legacy_id(&pool, "05abc").await.unwrap(), None);
        assert_eq!(find_manager_client_id(&pool, "05abc").await.unwrap(), None);

        insert_account(&pool, "b", Some("05abc"), Some("grid.2.2"), Some("APP-MGR")).await.unwrap();
        assert_eq!(find_legacy_id(&pool, "05abc").await.unwrap().as_deref(), Some("grid.2.2"));
        assert_eq!(
            find_manager_client_id(&pool, "05abc").await.unwrap().as_deref(),
            Some("APP-MGR")
        );
    }

    #[tokio::test]
    async fn test_list_primary_ids_is_distinct() {
        let pool = init_memory_database().await.unwrap();
        insert_account(&pool, "a", Some("07b"), None, None).await.unwrap();
        insert_account(&pool, "b", Some("05a"), None, None).await.unwrap();
        insert_account(&pool, "c", Some("07b"), None, None).await.unwrap();
        insert_account(&pool, "d", None, None, None).await.unwrap();
        insert_account(&pool, "e", Some(" "), None, None).await.unwrap();

        assert_eq!(list_primary_ids(&pool).await.unwrap(), vec!["05a", "07b"]);
    }

    #[tokio::test]
    async fn test_padded_primary_id_still_matches() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query(
            "INSERT INTO institution_accounts (account_name, primary_id, legacy_id, manager_client_id) \
             VALUES ('padded', ' 05abc  ', NULL, 'APP-MGR')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let ids = list_primary_ids(&pool).await.unwrap();
        assert_eq!(ids, vec!["05abc"]);

        assert_eq!(
            find_manager_client_id(&pool, &ids[0]).await.unwrap().as_deref(),
            Some("APP-MGR")
        );
        assert_eq!(backfill_legacy_id(&pool, &ids[0], "grid.3.3").await.unwrap(), 1);
        assert_eq!(
            find_legacy_id(&pool, " 05abc").await.unwrap().as_deref(),
            Some("grid.3.3")
        );
    }

    #[tokio::test]
    async fn test_insert_trims_primary_id() {
        let pool = init_memory_database().await.unwrap();
        insert_account(&pool, "a", Some(" 05abc "), None, None).await.unwrap();

        let stored: String = sqlx::query_scalar("SELECT primary_id FROM institution_accounts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, "05abc");
    }
}
