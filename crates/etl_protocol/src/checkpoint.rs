//! Checkpoint/resume state.

use crate::job::JobId;
use crate::plan::ColumnPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Source-specific resume state: either a row count to skip (file sources)
/// or an opaque map (e.g. `{nextUrl: ...}` for a paginated API).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResumeState {
    SkipRows { skip_rows: u64 },
    Opaque(HashMap<String, serde_json::Value>),
}

impl ResumeState {
    pub fn skip_rows(n: u64) -> Self {
        ResumeState::SkipRows { skip_rows: n }
    }

    pub fn next_url(url: impl Into<String>) -> Self {
        let mut map = HashMap::new();
        map.insert("nextUrl".to_string(), serde_json::Value::String(url.into()));
        ResumeState::Opaque(map)
    }

    pub fn as_skip_rows(&self) -> Option<u64> {
        match self {
            ResumeState::SkipRows { skip_rows } => Some(*skip_rows),
            _ => None,
        }
    }

    pub fn as_next_url(&self) -> Option<&str> {
        match self {
            ResumeState::Opaque(map) => map.get("nextUrl").and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

/// A durable snapshot sufficient to resume a job without re-inserting rows.
///
/// Invariant: a checkpoint refers to a row index from which resuming yields
/// the same effective output as a fresh run (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job_id: JobId,
    pub table: String,
    pub last_processed_index: u64,
    pub last_processed_at: DateTime<Utc>,
    pub resume_state: ResumeState,
    pub column_plan: ColumnPlan,
}

impl Checkpoint {
    pub fn new(
        job_id: JobId,
        table: impl Into<String>,
        last_processed_index: u64,
        resume_state: ResumeState,
        column_plan: ColumnPlan,
    ) -> Self {
        Self {
            job_id,
            table: table.into(),
            last_processed_index,
            last_processed_at: Utc::now(),
            resume_state,
            column_plan,
        }
    }
}
