//! The unified error taxonomy of spec.md §7, aggregated from the per-crate
//! error enums the way the teacher's binary aggregates `casparian_db::DbError`,
//! `casparian_db::lock::LockError`, and friends.

use thiserror::Error;

/// Top-level ETL error kind. Individual crates define their own narrower
/// error enums and convert into this one at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Invalid request shape, e.g. upsert without key columns. Terminal,
    /// never retried, raised before any I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unparseable record from a source. Terminal for that job.
    #[error("source format error: {0}")]
    SourceFormat(String),

    /// Row failed table validation. Terminal only in strict mode.
    #[error("invalid row at index {row_index}: {reason}")]
    InvalidRow { row_index: u64, reason: String },

    /// Loader-phase database error believed to be retryable.
    #[error("transient database error: {0}")]
    TransientDb(String),

    /// Non-retryable or exhausted-retry database error.
    #[error("loader failure: {0}")]
    LoaderFailure(String),

    /// External cancellation signal or safety-limit trip.
    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    /// Checkpoint read/write failure; logged as a warning, never fails a job
    /// that would otherwise succeed.
    #[error("checkpoint io error: {0}")]
    CheckpointIo(String),

    /// Dead-letter spill failure; same non-fatal treatment as `CheckpointIo`.
    #[error("dead letter io error: {0}")]
    DeadLetterIo(String),
}

impl EtlError {
    pub fn config(message: impl Into<String>) -> Self {
        EtlError::Config(message.into())
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        EtlError::Cancelled { reason: reason.into() }
    }

    /// Machine-readable status code for progress events / job records.
    pub fn code(&self) -> &'static str {
        match self {
            EtlError::Config(_) => "config_error",
            EtlError::SourceFormat(_) => "source_format",
            EtlError::InvalidRow { .. } => "invalid_row",
            EtlError::TransientDb(_) => "transient_db",
            EtlError::LoaderFailure(_) => "loader_failure",
            EtlError::Cancelled { .. } => "cancelled",
            EtlError::CheckpointIo(_) => "checkpoint_io",
            EtlError::DeadLetterIo(_) => "dead_letter_io",
        }
    }

    /// Whether this error kind is safe for the orchestrator's bounded-retry
    /// wrapper to retry (spec.md §7: only the bulk-load phase ever retries).
    pub fn is_retryable(&self) -> bool {
        matches!(self, EtlError::TransientDb(_))
    }
}

/// Safety-limit cancellation reasons, used verbatim as the job's terminal
/// reason string (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyLimit {
    MaxRows,
    MaxDurationMs,
    MaxDeadLetters,
    MaxHeapMb,
}

impl SafetyLimit {
    pub fn reason(self) -> &'static str {
        match self {
            SafetyLimit::MaxRows => "cancelled_limit_rows",
            SafetyLimit::MaxDurationMs => "cancelled_limit_duration",
            SafetyLimit::MaxDeadLetters => "cancelled_limit_dead_letters",
            SafetyLimit::MaxHeapMb => "cancelled_limit_heap",
        }
    }
}
