//! Progress events and the final result object (spec.md §6).

use crate::job::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point-in-time snapshot of a job, broadcast to subscribers at most once
/// per progress tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub table: String,
    pub source_type: String,
    pub attempted_rows: u64,
    pub inserted_rows: u64,
    pub rejected_rows: u64,
    pub dead_letter_count: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub estimated_total: Option<u64>,
}

/// The object returned to the caller once a job reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlResult {
    pub table: String,
    pub duration_ms: u64,
    pub attempted_rows: u64,
    pub inserted_rows: u64,
    pub rejected_rows: u64,
    pub rows_per_second: f64,
    pub source_type: String,
    pub columns: Vec<String>,
    pub job_id: Option<JobId>,
    pub checkpoint_resumed: Option<bool>,
    pub dead_letter_path: Option<String>,
    pub dead_letter_count: Option<u64>,
}
