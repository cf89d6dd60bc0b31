//! The Job Registry (C6): a process-wide keyed collection of `EtlJob`,
//! single-writer-per-job, with a progress broadcast subscribers can watch.

use etl_protocol::{EtlJob, JobId, JobStatus, ProgressEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

struct Entry {
    job: EtlJob,
    progress_tx: broadcast::Sender<ProgressEvent>,
}

/// Shared, cloneable handle to the registry. Writers serialise per-job via
/// the inner mutex; readers take a snapshot copy of the `EtlJob`.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<JobId, Entry>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job {0} is already registered")]
    DuplicateJob(JobId),
    #[error("job {0} not found")]
    NotFound(JobId),
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, job: EtlJob) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(RegistryError::DuplicateJob(job.id.clone()));
        }
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        jobs.insert(job.id.clone(), Entry { job, progress_tx });
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> Option<EtlJob> {
        self.jobs.lock().await.get(id).map(|entry| entry.job.clone())
    }

    pub async fn subscribe(&self, id: &JobId) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.jobs.lock().await.get(id).map(|entry| entry.progress_tx.subscribe())
    }

    async fn update<F>(&self, id: &JobId, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut EtlJob) -> bool,
    {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        f(&mut entry.job);
        let _ = entry.progress_tx.send(to_progress_event(&entry.job));
        Ok(())
    }

    pub async fn update_progress(
        &self,
        id: &JobId,
        attempted: u64,
        inserted: u64,
        rejected: u64,
        dead_letter: u64,
    ) -> Result<(), RegistryError> {
        self.update(id, |job| {
            job.transition(JobStatus::Running, None);
            job.counters.attempted = attempted;
            job.counters.inserted = inserted;
            job.counters.rejected = rejected;
            job.counters.dead_letter = dead_letter;
            true
        })
        .await
    }

    pub async fn complete(&self, id: &JobId) -> Result<(), RegistryError> {
        self.update(id, |job| job.transition(JobStatus::Completed, None)).await
    }

    pub async fn fail(&self, id: &JobId, reason: impl Into<String>) -> Result<(), RegistryError> {
        let reason = reason.into();
        self.update(id, |job| job.transition(JobStatus::Failed, Some(reason))).await
    }

    pub async fn cancel(&self, id: &JobId, reason: Option<String>) -> Result<(), RegistryError> {
        self.update(id, |job| job.transition(JobStatus::Cancelled, reason)).await
    }
}

fn to_progress_event(job: &EtlJob) -> ProgressEvent {
    ProgressEvent {
        job_id: job.id.clone(),
        status: job.status,
        table: job.table.clone(),
        source_type: job.source_type.clone(),
        attempted_rows: job.counters.attempted,
        inserted_rows: job.counters.inserted,
        rejected_rows: job.counters.rejected,
        dead_letter_count: job.counters.dead_letter,
        started_at: job.started_at,
        updated_at: job.updated_at,
        error: job.error.clone(),
        estimated_total: job.estimated_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_register_is_an_error() {
        let registry = JobRegistry::new();
        let job = EtlJob::new(JobId::new("job-1"), "orders", "csv");
        registry.register(job.clone()).await.unwrap();
        assert!(matches!(registry.register(job).await, Err(RegistryError::DuplicateJob(_))));
    }

    #[tokio::test]
    async fn subscribers_receive_progress_updates() {
        let registry = JobRegistry::new();
        let id = JobId::new("job-2");
        registry.register(EtlJob::new(id.clone(), "orders", "csv")).await.unwrap();
        let mut rx = registry.subscribe(&id).await.unwrap();

        registry.update_progress(&id, 10, 9, 1, 0).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.attempted_rows, 10);
        assert_eq!(event.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn terminal_job_stays_terminal() {
        let registry = JobRegistry::new();
        let id = JobId::new("job-3");
        registry.register(EtlJob::new(id.clone(), "orders", "csv")).await.unwrap();
        registry.complete(&id).await.unwrap();
        registry.fail(&id, "too late").await.unwrap();
        let job = registry.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}
