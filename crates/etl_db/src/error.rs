//! Error types for the database layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("no columns matched between source and table {table}")]
    NoColumnsMatch { table: String },

    #[error("source mapping references unknown column {column} on table {table}")]
    UnknownMappedColumn { table: String, column: String },

    #[error("bulk load failed: {0}")]
    LoadFailed(String),

    #[error("invalid database url: {0}")]
    InvalidUrl(String),
}

impl DbError {
    pub fn load_failed(msg: impl Into<String>) -> Self {
        Self::LoadFailed(msg.into())
    }
}

impl From<DbError> for etl_protocol::EtlError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Sqlx(e) => etl_protocol::EtlError::TransientDb(e.to_string()),
            DbError::TableNotFound(t) => etl_protocol::EtlError::Config(format!("unknown table {t}")),
            DbError::NoColumnsMatch { table } => {
                etl_protocol::EtlError::Config(format!("no columns matched for table {table}"))
            }
            DbError::UnknownMappedColumn { table, column } => etl_protocol::EtlError::Config(format!(
                "source mapping references unknown column {column} on table {table}"
            )),
            DbError::LoadFailed(msg) => etl_protocol::EtlError::LoaderFailure(msg),
            DbError::InvalidUrl(url) => etl_protocol::EtlError::Config(format!("invalid database url: {url}")),
        }
    }
}
