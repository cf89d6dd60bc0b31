//! `EtlJob`: identifier, lifecycle status, and running counters.
//!
//! Grounded on the teacher's canonical `JobId`/`ProcessingStatus` newtypes
//! (`casparian_protocol::types::{JobId, ProcessingStatus}`), narrowed to the
//! five-state lifecycle spec.md §3 defines for a single ETL run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical job identifier. Callers may supply their own (e.g. a UUID
/// string) or let the registry mint one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The five-state lifecycle of a single ETL job (spec.md §3).
///
/// `Completed`, `Failed`, and `Cancelled` are terminal: once reached, the
/// job record is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Running counters for a job, updated as rows stream through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub attempted: u64,
    pub inserted: u64,
    pub rejected: u64,
    pub dead_letter: u64,
}

/// A single ETL job's full lifecycle record, as tracked by the job registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlJob {
    pub id: JobId,
    pub table: String,
    pub source_type: String,
    pub status: JobStatus,
    pub counters: JobCounters,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub estimated_total: Option<u64>,
}

impl EtlJob {
    pub fn new(id: JobId, table: impl Into<String>, source_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            table: table.into(),
            source_type: source_type.into(),
            status: JobStatus::Pending,
            counters: JobCounters::default(),
            started_at: now,
            updated_at: now,
            error: None,
            estimated_total: None,
        }
    }

    /// Apply a status transition, refusing to mutate a terminal job.
    ///
    /// Returns `false` (and leaves the job untouched) if it is already
    /// terminal, matching spec.md §3's "terminal states are immutable".
    #[must_use]
    pub fn transition(&mut self, status: JobStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if error.is_some() {
            self.error = error;
        }
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_job_cannot_transition() {
        let mut job = EtlJob::new(JobId::new("job-1"), "orders", "csv");
        assert!(job.transition(JobStatus::Completed, None));
        assert!(!job.transition(JobStatus::Failed, Some("late error".into())));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.error, None);
    }

    #[test]
    fn job_id_roundtrips_through_json() {
        let id = JobId::generate();
        let encoded = serde_json::to_string(&id).unwrap();
        let decoded: JobId = serde_json::from_str(&encoded).unwrap();
        assert_eq!(id, decoded);
    }
}
