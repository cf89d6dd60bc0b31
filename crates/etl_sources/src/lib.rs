//! Row Sources (C1): CSV, JSON, and HTTP API sources that each produce a
//! lazy, finite sequence of [`etl_protocol::Record`] values with resume and
//! cancellation support.

pub mod api_source;
pub mod compression;
pub mod csv_source;
pub mod json_source;

use async_trait::async_trait;
use etl_protocol::{EtlError, Record};

/// Common contract every row source implements. `next_record` returns
/// `Ok(None)` once the source is exhausted, mirroring the teacher's
/// job-execution loops that treat a `None` poll as "done, not failed".
#[async_trait]
pub trait RowSource: Send {
    async fn next_record(&mut self) -> Result<Option<Record>, EtlError>;

    /// Opaque resume state the orchestrator should persist after this call,
    /// if the source has one to report (file sources report `skipRows`
    /// implicitly via the caller's own row counter; API sources report
    /// their next page URL here).
    fn resume_state(&self) -> Option<serde_json::Value> {
        None
    }
}

pub use api_source::{ApiSource, ApiSourceOptions, HttpMethod};
pub use compression::Compression;
pub use csv_source::{CsvSource, CsvSourceOptions};
pub use json_source::{JsonMode, JsonSource, JsonSourceOptions};
