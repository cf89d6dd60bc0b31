//! Dead-letter and terminal-failure record shapes.

use crate::job::JobId;
use crate::value::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record the pipeline could not load but chose not to fail the job over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRow {
    pub row_index: u64,
    pub raw_record: Record,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl DeadLetterRow {
    pub fn new(row_index: u64, raw_record: Record, error: impl Into<String>) -> Self {
        Self {
            row_index,
            raw_record,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One row per terminal pipeline failure, destined for the failures log table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: uuid::Uuid,
    pub job_id: JobId,
    pub stage: String,
    pub table: String,
    pub approx_row: u64,
    pub error_code: String,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(
        job_id: JobId,
        stage: impl Into<String>,
        table: impl Into<String>,
        approx_row: u64,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            job_id,
            stage: stage.into(),
            table: table.into(),
            approx_row,
            error_code: error_code.into(),
            error_message: error_message.into(),
            created_at: Utc::now(),
        }
    }
}
