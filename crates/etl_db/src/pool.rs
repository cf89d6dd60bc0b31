//! Database pool creation.
//!
//! Narrowed from the teacher's multi-backend pool (SQLite/DuckDB/Postgres
//! selected at compile time) to PostgreSQL only: `COPY ... WITH (FORMAT
//! text)` and `INSERT ... ON CONFLICT` are both Postgres-specific, so this
//! crate has no use for the teacher's backend-agnostic abstraction.

use crate::error::{DbError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// PostgreSQL connection configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub statement_timeout_ms: Option<u64>,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), max_connections: 10, statement_timeout_ms: None }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_statement_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.statement_timeout_ms = Some(timeout_ms);
        self
    }
}

/// Create a Postgres connection pool from configuration.
pub async fn create_pool(config: DbConfig) -> Result<PgPool> {
    if !config.url.starts_with("postgres://") && !config.url.starts_with("postgresql://") {
        return Err(DbError::InvalidUrl(config.url));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    if let Some(timeout_ms) = config.statement_timeout_ms {
        sqlx::query(&format!("SET statement_timeout = {timeout_ms}")).execute(&pool).await?;
    }

    info!(max_connections = config.max_connections, "connected to postgres database");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_postgres_url() {
        let config = DbConfig::new("sqlite::memory:");
        assert!(matches!(
            futures::executor::block_on(create_pool(config)),
            Err(DbError::InvalidUrl(_))
        ));
    }
}
