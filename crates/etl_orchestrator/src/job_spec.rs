//! The caller-facing description of one ETL job: which source to read,
//! which table to load into, and the policies governing it.

use etl_db::ParallelLoadOptions;
use etl_protocol::{RetryPolicy, SafetyLimits, SourceMapping};
use etl_sources::{ApiSourceOptions, CsvSourceOptions, JsonSourceOptions};

/// One of the three supported row sources, carrying that source's own
/// options (spec.md §4.1).
#[derive(Debug, Clone)]
pub enum SourceSpec {
    Csv(CsvSourceOptions),
    Json(JsonSourceOptions),
    Api(ApiSourceOptions),
}

impl SourceSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            SourceSpec::Csv(_) => "csv",
            SourceSpec::Json(_) => "json",
            SourceSpec::Api(_) => "api",
        }
    }
}

/// Whether to run the normal streaming load, or to buffer the whole source
/// in memory and hand it to the parallel bulk loader (spec.md §4.9) instead.
/// Parallel mode trades checkpoint/resume granularity (it checkpoints only
/// once, at the end) for throughput on sources small enough to fit in memory.
#[derive(Debug, Clone)]
pub enum LoadMode {
    Streaming,
    Parallel(ParallelLoadOptions),
}

#[derive(Debug, Clone)]
pub struct JobSpec {
    pub table: String,
    pub source: SourceSpec,
    pub source_mapping: Option<SourceMapping>,
    pub conflict: etl_protocol::plan::ConflictPolicy,
    pub upsert_key_columns: Vec<String>,
    pub upsert_update_columns: Option<Vec<String>>,
    pub safety_limits: SafetyLimits,
    pub retry_policy: RetryPolicy,
    pub high_water_mark: usize,
    pub dead_letter_buffer_capacity: usize,
    pub load_mode: LoadMode,
    /// When set, the first row that fails coercion or table validation
    /// aborts the job with `InvalidRow` instead of being routed to the
    /// dead-letter collector.
    pub strict: bool,
}

impl JobSpec {
    pub fn new(table: impl Into<String>, source: SourceSpec) -> Self {
        Self {
            table: table.into(),
            source,
            source_mapping: None,
            conflict: etl_protocol::plan::ConflictPolicy::Error,
            upsert_key_columns: Vec::new(),
            upsert_update_columns: None,
            safety_limits: SafetyLimits::default(),
            retry_policy: RetryPolicy::default(),
            high_water_mark: etl_protocol::DEFAULT_HIGH_WATER_MARK,
            dead_letter_buffer_capacity: 1_000,
            load_mode: LoadMode::Streaming,
            strict: false,
        }
    }
}
