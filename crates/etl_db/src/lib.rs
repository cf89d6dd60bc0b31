//! PostgreSQL integration for the streaming ETL core: pool setup, live
//! schema introspection, the single-stream bulk loader (C4), and the
//! parallel bulk loader (C9).

pub mod error;
pub mod loader;
pub mod parallel;
pub mod pool;
pub mod schema;

pub use error::DbError;
pub use loader::{bulk_load, LoadOptions};
pub use parallel::{parallel_bulk_load, ParallelLoadOptions};
pub use pool::{create_pool, DbConfig};
pub use schema::{build_column_plan, introspect_table, TableColumn, TableSchema};
