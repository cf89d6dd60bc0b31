//! The on-disk job description this binary's `run` subcommand reads:
//! `{table, source, sourceMapping?, onConflict, upsertKeyColumns?,
//! upsertUpdateColumns?, limits?, retry?, highWaterMark?,
//! deadLetterBufferCapacity?, parallel?}`, in JSON or YAML. Checkpoint
//! resumption is not a field here: pass the same `--job-id` as a prior run
//! and the orchestrator picks its checkpoint back up automatically.
//!
//! A plain serde-friendly mirror of [`etl_orchestrator::JobSpec`]: the
//! orchestrator's own types carry runtime-only fields (open file handles,
//! `Duration`s with no natural wire format) that don't belong on a
//! deserializable struct, so this is its own schema, converted at the
//! boundary rather than derived directly on the library types.

use anyhow::{anyhow, Context, Result};
use etl_db::ParallelLoadOptions;
use etl_orchestrator::{JobSpec, LoadMode, SourceSpec};
use etl_protocol::{ColumnMapping, ConflictPolicy, RetryPolicy, SafetyLimits, SourceMapping};
use etl_sources::{ApiSourceOptions, CsvSourceOptions, HttpMethod, JsonMode, JsonSourceOptions};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFile {
    pub table: String,
    pub source: SourceFile,
    #[serde(default)]
    pub source_mapping: Option<Vec<ColumnMappingFile>>,
    #[serde(default = "default_conflict")]
    pub on_conflict: ConflictPolicy,
    #[serde(default)]
    pub upsert_key_columns: Vec<String>,
    #[serde(default)]
    pub upsert_update_columns: Option<Vec<String>>,
    #[serde(default)]
    pub limits: Option<SafetyLimits>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub high_water_mark: Option<usize>,
    #[serde(default)]
    pub dead_letter_buffer_capacity: Option<usize>,
    #[serde(default)]
    pub parallel: Option<ParallelLoadOptionsFile>,
    #[serde(default)]
    pub strict: bool,
}

fn default_conflict() -> ConflictPolicy {
    ConflictPolicy::Error
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMappingFile {
    pub source_key: String,
    pub db_column: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelLoadOptionsFile {
    #[serde(default)]
    pub chunks: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceFile {
    #[serde(rename_all = "camelCase")]
    Csv {
        path: PathBuf,
        #[serde(default)]
        delimiter: Option<String>,
        #[serde(default)]
        skip_rows: u64,
    },
    #[serde(rename_all = "camelCase")]
    Json {
        path: PathBuf,
        #[serde(default)]
        mode: JsonModeFile,
        #[serde(default)]
        skip_rows: u64,
    },
    #[serde(rename_all = "camelCase")]
    Api {
        url: String,
        #[serde(default)]
        method: HttpMethodFile,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<serde_json::Value>,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        data_path: Option<String>,
        #[serde(default)]
        next_page_path: Option<String>,
        #[serde(default)]
        max_pages: Option<u32>,
        #[serde(default)]
        min_request_interval_ms: Option<u64>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonModeFile {
    #[default]
    Ndjson,
    Array,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethodFile {
    #[default]
    Get,
    Post,
}

/// Parse a job description file, dispatching on extension: `.yaml`/`.yml`
/// as YAML, everything else as JSON.
pub fn load(path: &Path) -> Result<JobFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read job file {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {} as YAML", path.display()))
    } else {
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {} as JSON", path.display()))
    }
}

impl JobFile {
    pub fn into_job_spec(self) -> Result<JobSpec> {
        let source = match self.source {
            SourceFile::Csv { path, delimiter, skip_rows } => {
                let mut options = CsvSourceOptions::new(path).with_skip_rows(skip_rows);
                if let Some(delim) = delimiter {
                    let byte = *delim.as_bytes().first().ok_or_else(|| anyhow!("delimiter must be one character"))?;
                    options = options.with_delimiter(byte);
                }
                SourceSpec::Csv(options)
            }
            SourceFile::Json { path, mode, skip_rows } => {
                let mode = match mode {
                    JsonModeFile::Ndjson => JsonMode::NdJson,
                    JsonModeFile::Array => JsonMode::Array,
                };
                SourceSpec::Json(JsonSourceOptions::new(path, mode).with_skip_rows(skip_rows))
            }
            SourceFile::Api {
                url,
                method,
                headers,
                body,
                timeout_ms,
                data_path,
                next_page_path,
                max_pages,
                min_request_interval_ms,
            } => {
                let mut options = ApiSourceOptions::new(url);
                options.method = match method {
                    HttpMethodFile::Get => HttpMethod::Get,
                    HttpMethodFile::Post => HttpMethod::Post,
                };
                options.headers = headers;
                options.body = body;
                if let Some(ms) = timeout_ms {
                    options.timeout = Duration::from_millis(ms);
                }
                options.data_path = data_path;
                options.next_page_path = next_page_path;
                options.max_pages = max_pages;
                if let Some(ms) = min_request_interval_ms {
                    options.min_request_interval = Duration::from_millis(ms);
                }
                SourceSpec::Api(options)
            }
        };

        let mut spec = JobSpec::new(self.table, source);
        spec.strict = self.strict;
        spec.conflict = self.on_conflict;
        spec.upsert_key_columns = self.upsert_key_columns;
        spec.upsert_update_columns = self.upsert_update_columns;
        if let Some(limits) = self.limits {
            spec.safety_limits = limits;
        }
        if let Some(retry) = self.retry {
            spec.retry_policy = retry;
        }
        if let Some(hwm) = self.high_water_mark {
            spec.high_water_mark = hwm;
        }
        if let Some(capacity) = self.dead_letter_buffer_capacity {
            spec.dead_letter_buffer_capacity = capacity;
        }
        if let Some(mapping) = self.source_mapping {
            spec.source_mapping = Some(SourceMapping {
                pairs: mapping
                    .into_iter()
                    .map(|m| ColumnMapping { source_key: m.source_key, db_column: m.db_column })
                    .collect(),
            });
        }
        if let Some(parallel) = self.parallel {
            let mut options = ParallelLoadOptions {
                conflict: spec.conflict,
                upsert_key_columns: spec.upsert_key_columns.clone(),
                upsert_update_columns: spec.upsert_update_columns.clone(),
                ..ParallelLoadOptions::default()
            };
            if let Some(chunks) = parallel.chunks {
                options.chunks = chunks;
            }
            spec.load_mode = LoadMode::Parallel(options);
        }

        if matches!(spec.conflict, ConflictPolicy::Upsert) && spec.upsert_key_columns.is_empty() {
            return Err(anyhow!("onConflict upsert requires at least one upsertKeyColumns entry"));
        }

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_job_parses_from_json() {
        let json = r#"{
            "table": "orders",
            "source": {"type": "csv", "path": "orders.csv"},
            "onConflict": "error"
        }"#;
        let file: JobFile = serde_json::from_str(json).unwrap();
        let spec = file.into_job_spec().unwrap();
        assert_eq!(spec.table, "orders");
        assert!(matches!(spec.source, SourceSpec::Csv(_)));
    }

    #[test]
    fn upsert_without_key_columns_is_rejected() {
        let json = r#"{
            "table": "orders",
            "source": {"type": "csv", "path": "orders.csv"},
            "onConflict": "upsert"
        }"#;
        let file: JobFile = serde_json::from_str(json).unwrap();
        assert!(file.into_job_spec().is_err());
    }

    #[test]
    fn strict_flag_defaults_to_false_and_is_carried_through() {
        let json = r#"{
            "table": "orders",
            "source": {"type": "csv", "path": "orders.csv"},
            "onConflict": "error"
        }"#;
        let file: JobFile = serde_json::from_str(json).unwrap();
        assert!(!file.into_job_spec().unwrap().strict);

        let json = r#"{
            "table": "orders",
            "source": {"type": "csv", "path": "orders.csv"},
            "onConflict": "error",
            "strict": true
        }"#;
        let file: JobFile = serde_json::from_str(json).unwrap();
        assert!(file.into_job_spec().unwrap().strict);
    }

    #[test]
    fn api_job_parses_method_and_headers() {
        let json = r#"{
            "table": "events",
            "source": {
                "type": "api",
                "url": "https://example.test/events",
                "method": "post",
                "headers": {"Authorization": "Bearer token"}
            }
        }"#;
        let file: JobFile = serde_json::from_str(json).unwrap();
        let spec = file.into_job_spec().unwrap();
        match spec.source {
            SourceSpec::Api(options) => {
                assert_eq!(options.method, HttpMethod::Post);
                assert_eq!(options.headers.get("Authorization").map(String::as_str), Some("Bearer token"));
            }
            _ => panic!("expected api source"),
        }
    }
}
