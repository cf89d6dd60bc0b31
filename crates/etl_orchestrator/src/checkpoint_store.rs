//! The Checkpoint Store (C7): one file per job, written atomically via
//! write-to-temp-then-rename, grounded on `casparian_sinks`'s
//! `{}.tmp` + `fs::rename` commit discipline.

use etl_protocol::{Checkpoint, JobId};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.checkpoint.json", job_id.as_str()))
    }

    fn temp_path_for(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!(".{}.checkpoint.json.tmp", job_id.as_str()))
    }

    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointStoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let final_path = self.path_for(&checkpoint.job_id);
        let temp_path = self.temp_path_for(&checkpoint.job_id);
        let body = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(&temp_path, body).await?;
        tokio::fs::rename(&temp_path, &final_path).await?;
        Ok(())
    }

    /// Returns `None` if no checkpoint exists, or if the file on disk is
    /// malformed (treated as absent, with a warning, per spec.md §4.7).
    pub async fn load(&self, job_id: &JobId) -> Option<Checkpoint> {
        let path = self.path_for(job_id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to read checkpoint file");
                return None;
            }
        };
        match serde_json::from_slice(&body) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "malformed checkpoint file treated as absent");
                None
            }
        }
    }

    pub async fn delete(&self, job_id: &JobId) -> Result<(), CheckpointStoreError> {
        let path = self.path_for(job_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl_protocol::ResumeState;

    fn sample(job_id: &str) -> Checkpoint {
        Checkpoint::new(JobId::new(job_id), "orders", 100, ResumeState::skip_rows(100), Default::default())
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = sample("job-1");
        store.save(&checkpoint).await.unwrap();
        let loaded = store.load(&checkpoint.job_id).await.unwrap();
        assert_eq!(loaded.last_processed_index, 100);
    }

    #[tokio::test]
    async fn load_of_missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load(&JobId::new("missing")).await.is_none());
    }

    #[tokio::test]
    async fn malformed_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let job_id = JobId::new("job-2");
        tokio::fs::write(store.path_for(&job_id), b"not json").await.unwrap();
        assert!(store.load(&job_id).await.is_none());
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = sample("job-3");
        store.save(&checkpoint).await.unwrap();
        store.delete(&checkpoint.job_id).await.unwrap();
        assert!(store.load(&checkpoint.job_id).await.is_none());
    }
}
