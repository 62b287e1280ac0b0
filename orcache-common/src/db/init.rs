//! Database initialization
//!
//! Opens (creating on first run) the SQLite cache database and makes sure
//! every cache table exists. All `CREATE` statements are idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current schema revision recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets report readers keep reading while a rebuild writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Every pooled connection to `sqlite::memory:` would see its own empty
/// database, so the pool is capped at one connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create every table used by the cache
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_institution_accounts_table(pool).await?;
    create_publication_cache_table(pool).await?;
    create_grant_cache_table(pool).await?;
    create_affiliation_status_table(pool).await?;
    create_profile_summary_table(pool).await?;
    create_cache_run_log_table(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

/// Locally registered accounts, each scoped to one institution
///
/// Several accounts may share a `primary_id`. The legacy id is healed onto
/// all of them; the manager client id of any one of them is trusted for the
/// whole institution.
async fn create_institution_accounts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS institution_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_name TEXT NOT NULL UNIQUE,
            institution_name TEXT,
            primary_id TEXT,
            legacy_id TEXT,
            manager_client_id TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_institution_accounts_primary ON institution_accounts(primary_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_publication_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS publication_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            institution TEXT NOT NULL,
            person TEXT NOT NULL,
            put_code INTEGER,
            title TEXT,
            work_type TEXT,
            journal TEXT,
            pub_year TEXT,
            pub_month TEXT,
            pub_day TEXT,
            doi TEXT,
            issn TEXT,
            other_external_ids TEXT,
            source TEXT,
            visibility TEXT,
            url TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_publication_cache_institution ON publication_cache(institution)",
        "CREATE INDEX IF NOT EXISTS idx_publication_cache_person ON publication_cache(person)",
        "CREATE INDEX IF NOT EXISTS idx_publication_cache_doi ON publication_cache(doi)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}

async fn create_grant_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS grant_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            institution TEXT NOT NULL,
            person TEXT NOT NULL,
            title TEXT,
            grant_type TEXT,
            org_name TEXT,
            city TEXT,
            country TEXT,
            start_year TEXT,
            start_month TEXT,
            start_day TEXT,
            end_year TEXT,
            end_month TEXT,
            end_day TEXT,
            grant_number TEXT,
            currency TEXT,
            amount TEXT,
            source TEXT,
            visibility TEXT,
            url TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_grant_cache_institution ON grant_cache(institution)",
        "CREATE INDEX IF NOT EXISTS idx_grant_cache_person ON grant_cache(person)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}

async fn create_affiliation_status_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS affiliation_status (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            institution TEXT NOT NULL,
            person TEXT NOT NULL,
            is_managed INTEGER NOT NULL DEFAULT 0,
            last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(institution, person)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Global, never purged: a person may belong to several institutions
async fn create_profile_summary_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profile_summary (
            person TEXT PRIMARY KEY,
            given_names TEXT,
            family_name TEXT,
            credit_name TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_cache_run_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_run_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL UNIQUE,
            institution TEXT NOT NULL,
            target TEXT NOT NULL,
            status TEXT NOT NULL,
            row_count INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            started_at TEXT NOT NULL,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cache_run_log_institution ON cache_run_log(institution, target)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
