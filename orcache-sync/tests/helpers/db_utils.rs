//! Database Test Utilities

use anyhow::Result;
use orcache_common::db::init_database;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a temporary cache database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_orcache.db");
    let pool = init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Make every insert into `table` with the given title fail
pub async fn reject_title(pool: &SqlitePool, table: &str, title: &str) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TRIGGER reject_{table}_title BEFORE INSERT ON {table}
        WHEN NEW.title = '{title}'
        BEGIN SELECT RAISE(ABORT, 'rejected by test trigger'); END
        "#
    ))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_rows(pool: &SqlitePool, table: &str, institution: &str) -> Result<i64> {
    let n = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE institution = ?",
        table
    ))
    .bind(institution)
    .fetch_one(pool)
    .await?;
    Ok(n)
}
