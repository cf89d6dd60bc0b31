//! Job registry, checkpoint store, dead-letter collector, retry policy, and
//! the pipeline state machine that ties the other crates together into one
//! runnable ETL job.

pub mod checkpoint_store;
pub mod deadletter;
pub mod job_spec;
pub mod pipeline;
pub mod registry;
pub mod retry;

pub use checkpoint_store::{CheckpointStore, CheckpointStoreError};
pub use deadletter::{DeadLetterCollector, DeadLetterError};
pub use job_spec::{JobSpec, LoadMode, SourceSpec};
pub use pipeline::{run_job, PipelineContext};
pub use registry::{JobRegistry, RegistryError};
pub use retry::run_with_retry;
