//! Shared data model and error taxonomy for the streaming ETL core.
//!
//! Every other crate in the workspace (`etl_sources`, `etl_transform`,
//! `etl_encoder`, `etl_db`, `etl_orchestrator`) depends on this crate for
//! its core vocabulary: `Value`/`Record`, `ColumnPlan`, `EtlJob`,
//! `Checkpoint`, `DeadLetterRow`, `FailureRecord`, and `EtlError`.

pub mod cancel;
pub mod checkpoint;
pub mod deadletter;
pub mod error;
pub mod job;
pub mod limits;
pub mod naming;
pub mod plan;
pub mod progress;
pub mod value;

pub use cancel::CancellationToken;
pub use checkpoint::{Checkpoint, ResumeState};
pub use deadletter::{DeadLetterRow, FailureRecord};
pub use error::{EtlError, SafetyLimit};
pub use job::{EtlJob, JobCounters, JobId, JobStatus};
pub use limits::{RetryPolicy, SafetyLimits, CHECKPOINT_INTERVAL_ROWS, DEFAULT_HIGH_WATER_MARK, DEFAULT_PROGRESS_INTERVAL_ROWS};
pub use naming::normalize_header;
pub use plan::{ColumnMapping, ColumnPlan, ConflictPolicy, SourceMapping};
pub use progress::{EtlResult, ProgressEvent};
pub use value::{Record, Value};
