//! The Dead-Letter Collector (C8): buffers rows the pipeline rejected
//! without failing the job, spilling to a job-scoped newline-delimited-JSON
//! file once the in-memory buffer passes capacity.

use etl_protocol::{DeadLetterRow, JobId, Record};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const DEFAULT_BUFFER_CAPACITY: usize = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum DeadLetterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub struct DeadLetterCollector {
    job_id: JobId,
    dir: PathBuf,
    buffer: Vec<DeadLetterRow>,
    capacity: usize,
    spilled_count: u64,
    spilled: bool,
}

impl DeadLetterCollector {
    pub fn new(job_id: JobId, dir: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            dir: dir.into(),
            buffer: Vec::new(),
            capacity: DEFAULT_BUFFER_CAPACITY,
            spilled_count: 0,
            spilled: false,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.deadletter.ndjson", self.job_id.as_str()))
    }

    pub fn count(&self) -> u64 {
        self.spilled_count + self.buffer.len() as u64
    }

    /// Record one rejected row. Order is preserved: spills never reorder
    /// rows relative to `row_index`.
    pub fn add(&mut self, row_index: u64, raw_record: Record, error: impl Into<String>) {
        self.buffer.push(DeadLetterRow::new(row_index, raw_record, error));
    }

    /// Spill the buffer to disk if it has grown past capacity. A no-op
    /// otherwise.
    pub async fn flush_if_over_capacity(&mut self) -> Result<(), DeadLetterError> {
        if self.buffer.len() >= self.capacity {
            self.spill().await?;
        }
        Ok(())
    }

    /// Force a final spill, returning the file path (if anything was ever
    /// written) and the total row count collected over the job's lifetime.
    pub async fn flush(&mut self) -> Result<(Option<String>, u64), DeadLetterError> {
        if !self.buffer.is_empty() {
            self.spill().await?;
        }
        let path = if self.spilled { Some(self.path().to_string_lossy().into_owned()) } else { None };
        Ok((path, self.spilled_count))
    }

    async fn spill(&mut self) -> Result<(), DeadLetterError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path();
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        for row in &self.buffer {
            let mut line = serde_json::to_vec(row)?;
            line.push(b'\n');
            file.write_all(&line).await?;
        }
        file.flush().await?;
        self.spilled_count += self.buffer.len() as u64;
        self.spilled = true;
        self.buffer.clear();
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u64) -> Record {
        Record::from_raw_pairs(vec![("row", n.to_string())])
    }

    #[tokio::test]
    async fn buffer_spills_once_capacity_is_reached() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = DeadLetterCollector::new(JobId::new("job-1"), dir.path()).with_capacity(2);
        collector.add(0, record(0), "bad");
        collector.flush_if_over_capacity().await.unwrap();
        assert_eq!(collector.count(), 1);

        collector.add(1, record(1), "bad");
        collector.flush_if_over_capacity().await.unwrap();
        assert_eq!(collector.count(), 2);
        assert!(tokio::fs::metadata(collector.path()).await.is_ok());
    }

    #[tokio::test]
    async fn flush_with_nothing_collected_returns_no_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = DeadLetterCollector::new(JobId::new("job-2"), dir.path());
        let (path, count) = collector.flush().await.unwrap();
        assert!(path.is_none());
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn spilled_rows_preserve_original_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = DeadLetterCollector::new(JobId::new("job-3"), dir.path()).with_capacity(1);
        for i in 0..3 {
            collector.add(i, record(i), "bad");
            collector.flush_if_over_capacity().await.unwrap();
        }
        let (path, count) = collector.flush().await.unwrap();
        assert_eq!(count, 3);
        let body = tokio::fs::read_to_string(path.unwrap()).await.unwrap();
        let indices: Vec<u64> = body
            .lines()
            .map(|line| serde_json::from_str::<DeadLetterRow>(line).unwrap().row_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
