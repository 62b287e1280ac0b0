//! Buffered bulk writes
//!
//! Rows are buffered in memory and written one transaction per batch. A
//! batch whose transaction fails is logged and dropped; only committed rows
//! are counted.

use crate::error::SyncResult;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::SqlitePool;

/// Prepared statement bound for one row
pub type RowQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// A row that knows its own insert statement
pub trait CacheRow {
    /// Statement with one placeholder per bound column
    const INSERT_SQL: &'static str;

    fn bind_row<'q>(&'q self, query: RowQuery<'q>) -> RowQuery<'q>;
}

/// Insert `rows` in a single transaction
///
/// Nothing is written unless every row is.
pub async fn insert_batch<R: CacheRow>(pool: &SqlitePool, rows: &[R]) -> SyncResult<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    for row in rows {
        row.bind_row(sqlx::query(R::INSERT_SQL))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(rows.len() as u64)
}

/// Totals reported by [`BatchWriter::finish`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub committed: u64,
    pub dropped: u64,
}

/// Memory-bounded writer flushing every `batch_size` rows
pub struct BatchWriter<'a, R: CacheRow> {
    pool: &'a SqlitePool,
    table: &'static str,
    batch_size: usize,
    buffer: Vec<R>,
    summary: WriteSummary,
}

impl<'a, R: CacheRow> BatchWriter<'a, R> {
    pub fn new(pool: &'a SqlitePool, table: &'static str, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            pool,
            table,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            summary: WriteSummary::default(),
        }
    }

    pub async fn push(&mut self, row: R) {
        self.buffer.push(row);
        if self.buffer.len() >= self.batch_size {
            self.flush().await;
        }
    }

    pub async fn extend(&mut self, rows: impl IntoIterator<Item = R>) {
        for row in rows {
            self.push(row).await;
        }
    }

    /// Write whatever is buffered
    pub async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.buffer);
        match insert_batch(self.pool, &batch).await {
            Ok(written) => {
                self.summary.committed += written;
                tracing::debug!(
                    table = self.table,
                    rows = written,
                    total = self.summary.committed,
                    "Flushed batch"
                );
            }
            Err(e) => {
                self.summary.dropped += batch.len() as u64;
                tracing::error!(
                    table = self.table,
                    rows = batch.len(),
                    error = %e,
                    "Batch insert failed; batch dropped"
                );
            }
        }
        self.buffer = Vec::with_capacity(self.batch_size);
    }

    /// Flush the remainder and report totals
    pub async fn finish(mut self) -> WriteSummary {
        self.flush().await;
        self.summary
    }
}
