//! The Bulk Loader (C4): stream encoded COPY lines into PostgreSQL.
//!
//! Grounded on the prepare/commit/rollback-with-guard discipline in
//! `casparian_sinks::SinkRegistry::finish_with_guard` — the `nothing`/
//! `upsert` paths stage into a temp table inside one transaction and only
//! commit once the post-COPY `INSERT ... SELECT` succeeds, rolling back on
//! any failure so the target table never observes a partial load.

use crate::error::{DbError, Result};
use crate::schema::TableSchema;
use etl_protocol::plan::ConflictPolicy;
use etl_protocol::ColumnPlan;
use futures::{Stream, StreamExt};
use sqlx::postgres::PgPool;
use std::collections::HashSet;

/// Options governing one bulk-load invocation.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub conflict: ConflictPolicy,
    pub upsert_key_columns: Vec<String>,
    pub upsert_update_columns: Option<Vec<String>>,
    pub progress_interval: u64,
}

impl LoadOptions {
    pub fn error() -> Self {
        Self { conflict: ConflictPolicy::Error, upsert_key_columns: Vec::new(), upsert_update_columns: None, progress_interval: etl_protocol::DEFAULT_PROGRESS_INTERVAL_ROWS }
    }

    pub fn nothing() -> Self {
        Self { conflict: ConflictPolicy::Nothing, upsert_key_columns: Vec::new(), upsert_update_columns: None, progress_interval: etl_protocol::DEFAULT_PROGRESS_INTERVAL_ROWS }
    }

    pub fn upsert(key_columns: Vec<String>) -> Self {
        Self { conflict: ConflictPolicy::Upsert, upsert_key_columns: key_columns, upsert_update_columns: None, progress_interval: etl_protocol::DEFAULT_PROGRESS_INTERVAL_ROWS }
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn copy_statement(table: &str, columns: &[String]) -> String {
    let cols = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    format!("COPY {} ({}) FROM STDIN WITH (FORMAT text, NULL '\\N')", quote_ident(table), cols)
}

/// Stream `lines` (already-encoded COPY text lines, newline-terminated)
/// into `table` according to `options.conflict`. Returns the number of rows
/// the database reports as actually persisted.
pub async fn bulk_load<S>(
    pool: &PgPool,
    table: &str,
    plan: &ColumnPlan,
    schema: &TableSchema,
    lines: S,
    options: &LoadOptions,
    mut on_progress: impl FnMut(u64) + Send,
) -> Result<u64>
where
    S: Stream<Item = Vec<u8>> + Unpin,
{
    match options.conflict {
        ConflictPolicy::Error => copy_direct(pool, table, plan, lines, options, &mut on_progress).await,
        ConflictPolicy::Nothing => copy_via_staging(pool, table, plan, schema, lines, options, &mut on_progress).await,
        ConflictPolicy::Upsert => {
            if options.upsert_key_columns.is_empty() {
                return Err(DbError::load_failed("upsert requires a non-empty upsertKeyColumns list"));
            }
            copy_via_staging(pool, table, plan, schema, lines, options, &mut on_progress).await
        }
    }
}

async fn copy_direct<S>(
    pool: &PgPool,
    table: &str,
    plan: &ColumnPlan,
    mut lines: S,
    options: &LoadOptions,
    on_progress: &mut (impl FnMut(u64) + Send),
) -> Result<u64>
where
    S: Stream<Item = Vec<u8>> + Unpin,
{
    let mut conn = pool.acquire().await?;
    let stmt = copy_statement(table, &plan.db_columns());
    let mut copy = conn.copy_in_raw(&stmt).await?;

    let mut streamed: u64 = 0;
    while let Some(line) = lines.next().await {
        copy.send(line.as_slice()).await?;
        streamed += 1;
        if streamed % options.progress_interval == 0 {
            on_progress(streamed);
        }
    }

    let rows = copy.finish().await?;
    on_progress(streamed);
    Ok(rows)
}

async fn copy_via_staging<S>(
    pool: &PgPool,
    table: &str,
    plan: &ColumnPlan,
    schema: &TableSchema,
    mut lines: S,
    options: &LoadOptions,
    on_progress: &mut (impl FnMut(u64) + Send),
) -> Result<u64>
where
    S: Stream<Item = Vec<u8>> + Unpin,
{
    let mut tx = pool.begin().await?;

    let staging = format!("etl_stage_{}", sanitize_for_ident(table));
    sqlx::query(&format!(
        "CREATE TEMP TABLE {} (LIKE {} INCLUDING DEFAULTS) ON COMMIT DROP",
        quote_ident(&staging),
        quote_ident(table)
    ))
    .execute(&mut *tx)
    .await?;

    let planned: HashSet<String> = plan.db_columns().into_iter().collect();
    for name in &schema.ordered_names {
        if !planned.contains(name) {
            sqlx::query(&format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
                quote_ident(&staging),
                quote_ident(name)
            ))
            .execute(&mut *tx)
            .await?;
        }
    }

    let stmt = copy_statement(&staging, &plan.db_columns());
    let mut copy = tx.copy_in_raw(&stmt).await?;
    let mut streamed: u64 = 0;
    while let Some(line) = lines.next().await {
        copy.send(line.as_slice()).await?;
        streamed += 1;
        if streamed % options.progress_interval == 0 {
            on_progress(streamed);
        }
    }
    copy.finish().await?;
    on_progress(streamed);

    let cols = plan.db_columns().iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    let insert_sql = match options.conflict {
        ConflictPolicy::Nothing => format!(
            "INSERT INTO {} ({cols}) SELECT {cols} FROM {} ON CONFLICT DO NOTHING",
            quote_ident(table),
            quote_ident(&staging)
        ),
        ConflictPolicy::Upsert => {
            let key_cols = options.upsert_key_columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
            let update_cols = options
                .upsert_update_columns
                .clone()
                .unwrap_or_else(|| plan.db_columns().into_iter().filter(|c| !options.upsert_key_columns.contains(c)).collect());
            let update_set = update_cols
                .iter()
                .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO {} ({cols}) SELECT {cols} FROM {} ON CONFLICT ({key_cols}) DO UPDATE SET {update_set}",
                quote_ident(table),
                quote_ident(&staging)
            )
        }
        ConflictPolicy::Error => unreachable!("error policy never takes the staging path"),
    };

    let result = sqlx::query(&insert_sql).execute(&mut *tx).await;
    let inserted = match result {
        Ok(done) => done.rows_affected(),
        Err(err) => {
            tx.rollback().await?;
            return Err(DbError::Sqlx(err));
        }
    };

    tx.commit().await?;
    Ok(inserted)
}

fn sanitize_for_ident(name: &str) -> String {
    name.chars().map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' }).collect()
}
