//! The Bulk Parallel Loader (C9): split an in-memory row set into N chunks,
//! drop secondary indexes, run N independent `COPY`+staging loads
//! concurrently, then recreate the indexes behind a guard so they always
//! come back even if a chunk load fails.

use crate::error::{DbError, Result};
use crate::loader::{bulk_load, LoadOptions};
use crate::schema::TableSchema;
use etl_protocol::plan::ConflictPolicy;
use etl_protocol::ColumnPlan;
use futures::stream;
use sqlx::postgres::PgPool;
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ParallelLoadOptions {
    pub chunks: usize,
    pub conflict: ConflictPolicy,
    pub upsert_key_columns: Vec<String>,
    pub upsert_update_columns: Option<Vec<String>>,
}

impl Default for ParallelLoadOptions {
    fn default() -> Self {
        Self { chunks: 4, conflict: ConflictPolicy::Nothing, upsert_key_columns: Vec::new(), upsert_update_columns: None }
    }
}

struct DroppedIndex {
    name: String,
    definition: String,
}

/// Load `rows` (already-encoded COPY lines, one `Vec<u8>` per row) into
/// `table` using `options.chunks` concurrent COPY streams. Each chunk
/// stages into its own temp table, so conflict resolution stays safe under
/// concurrency. Returns the total number of rows persisted.
pub async fn parallel_bulk_load(
    pool: &PgPool,
    table: &str,
    plan: &ColumnPlan,
    schema: &TableSchema,
    rows: Vec<Vec<u8>>,
    options: &ParallelLoadOptions,
) -> Result<u64> {
    if matches!(options.conflict, ConflictPolicy::Upsert) && options.upsert_key_columns.is_empty() {
        return Err(DbError::load_failed("upsert requires a non-empty upsertKeyColumns list"));
    }

    let dropped = drop_secondary_indexes(pool, table).await?;
    let result = run_chunks(pool, table, plan, schema, rows, options).await;
    recreate_indexes(pool, &dropped).await?;
    result
}

async fn run_chunks(
    pool: &PgPool,
    table: &str,
    plan: &ColumnPlan,
    schema: &TableSchema,
    rows: Vec<Vec<u8>>,
    options: &ParallelLoadOptions,
) -> Result<u64> {
    let chunk_count = options.chunks.max(1);
    let chunks = partition(rows, chunk_count);

    let load_options = LoadOptions {
        conflict: options.conflict,
        upsert_key_columns: options.upsert_key_columns.clone(),
        upsert_update_columns: options.upsert_update_columns.clone(),
        progress_interval: u64::MAX,
    };

    let futures = chunks.into_iter().map(|chunk| {
        let load_options = load_options.clone();
        async move {
            let line_stream = stream::iter(chunk);
            bulk_load(pool, table, plan, schema, line_stream, &load_options, |_| {}).await
        }
    });

    let results: Vec<Result<u64>> = futures::future::join_all(futures).await;
    let mut total = 0u64;
    for result in results {
        total += result?;
    }
    Ok(total)
}

/// Split `rows` into at most `chunk_count` chunks, preserving per-chunk
/// order; across chunks the merge order is arbitrary (spec.md §5).
fn partition(rows: Vec<Vec<u8>>, chunk_count: usize) -> Vec<Vec<Vec<u8>>> {
    if rows.is_empty() {
        return Vec::new();
    }
    let chunk_count = chunk_count.min(rows.len()).max(1);
    let base = rows.len() / chunk_count;
    let remainder = rows.len() % chunk_count;

    let mut chunks = Vec::with_capacity(chunk_count);
    let mut iter = rows.into_iter();
    for idx in 0..chunk_count {
        let size = base + if idx < remainder { 1 } else { 0 };
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

async fn drop_secondary_indexes(pool: &PgPool, table: &str) -> Result<Vec<DroppedIndex>> {
    let rows = sqlx::query(
        r#"SELECT indexname, indexdef FROM pg_indexes
           WHERE tablename = $1 AND indexname NOT IN (
               SELECT conname FROM pg_constraint WHERE contype IN ('p', 'u') AND conrelid = $1::regclass
           )"#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut dropped = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("indexname")?;
        let definition: String = row.try_get("indexdef")?;
        sqlx::query(&format!("DROP INDEX IF EXISTS \"{}\"", name.replace('"', "\"\""))).execute(pool).await?;
        dropped.push(DroppedIndex { name, definition });
    }
    Ok(dropped)
}

async fn recreate_indexes(pool: &PgPool, dropped: &[DroppedIndex]) -> Result<()> {
    for index in dropped {
        if let Err(err) = sqlx::query(&index.definition).execute(pool).await {
            tracing::error!(index = %index.name, error = %err, "failed to recreate index after parallel load");
            return Err(DbError::Sqlx(err));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_preserves_all_rows_and_order() {
        let rows: Vec<Vec<u8>> = (0..10).map(|i| vec![i as u8]).collect();
        let chunks = partition(rows.clone(), 4);
        assert_eq!(chunks.len(), 4);
        let flattened: Vec<Vec<u8>> = chunks.into_iter().flatten().collect();
        assert_eq!(flattened, rows);
    }

    #[test]
    fn partition_caps_chunk_count_to_row_count() {
        let rows: Vec<Vec<u8>> = (0..2).map(|i| vec![i as u8]).collect();
        let chunks = partition(rows, 4);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn partition_of_empty_rows_is_empty() {
        assert!(partition(Vec::new(), 4).is_empty());
    }
}
