//! The Pipeline Orchestrator (C5): drives one job through
//! `init -> planning -> streaming -> finalising -> {completed|failed|cancelled}`,
//! wiring the row source, transform layer, copy-line encoder, and bulk
//! loader together, with checkpointing, dead-letter quarantine, safety
//! limits, and bounded retry of the load phase.
//!
//! Grounded on `casparian_worker::Worker::execute_job`'s
//! dispatch-then-wrap-result pattern (`execute_job` -> `execute_job_inner`),
//! adapted from a one-shot RPC handler into a resumable streaming loop.

use crate::deadletter::DeadLetterCollector;
use crate::job_spec::{JobSpec, LoadMode, SourceSpec};
use crate::registry::JobRegistry;
use crate::retry::run_with_retry;
use crate::checkpoint_store::CheckpointStore;
use etl_db::{bulk_load, build_column_plan, introspect_table, parallel_bulk_load, LoadOptions, TableSchema};
use etl_encoder::{bounded_line_channel, encode_line, value_to_field};
use etl_protocol::{
    Checkpoint, ColumnPlan, EtlError, EtlJob, EtlResult, JobId, ResumeState, SafetyLimit, SafetyLimits,
};
use etl_protocol::CancellationToken;
use etl_sources::{ApiSource, CsvSource, JsonSource, RowSource};
use etl_transform::{ColumnSpec, RowMapper};
use sqlx::PgPool;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn, Instrument};

/// Shared dependencies every job running in this process draws on.
#[derive(Clone)]
pub struct PipelineContext {
    pub pool: PgPool,
    pub registry: JobRegistry,
    pub checkpoints: CheckpointStore,
    pub dead_letter_dir: PathBuf,
}

/// Sub-states of `JobStatus::Running`, logged at each transition. The job
/// registry only tracks the coarser `JobStatus`; this enum exists purely to
/// make the pipeline's own tracing readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Planning,
    Streaming,
    Finalising,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Streaming => "streaming",
            Stage::Finalising => "finalising",
        }
    }
}

/// Unit of work for one bulk-load/retry attempt. Fixed and independent of
/// total job size so the in-flight buffer `read_batch` builds stays bounded
/// regardless of how many rows the source holds; retries of the load phase
/// resend this buffer rather than re-reading the source, which a source
/// that has already emitted these rows cannot safely do.
///
/// Distinct from, and much smaller than, `CHECKPOINT_INTERVAL_ROWS` (the
/// durable-checkpoint cadence) and the loader's own `progress_interval`
/// (the job-registry progress cadence) — the three are independent and not
/// collapsed into one "batch size".
const LOAD_CHUNK_ROWS: u64 = 5_000;

const HEAP_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Periodic process-RSS sampler backing the `maxHeapMb` safety limit.
/// Refreshing on every record would add a syscall per row, so the reading
/// is cached and only refreshed once per `HEAP_SAMPLE_INTERVAL`.
struct HeapSampler {
    system: sysinfo::System,
    pid: sysinfo::Pid,
    last_refresh: Instant,
    cached_mb: u64,
}

impl HeapSampler {
    fn new() -> Self {
        let pid = sysinfo::Pid::from_u32(std::process::id());
        let mut system = sysinfo::System::new();
        system.refresh_process(pid);
        let cached_mb = system.process(pid).map(|p| p.memory() / (1024 * 1024)).unwrap_or(0);
        Self { system, pid, last_refresh: Instant::now(), cached_mb }
    }

    fn current_mb(&mut self) -> u64 {
        if self.last_refresh.elapsed() >= HEAP_SAMPLE_INTERVAL {
            self.system.refresh_process(self.pid);
            if let Some(process) = self.system.process(self.pid) {
                self.cached_mb = process.memory() / (1024 * 1024);
            }
            self.last_refresh = Instant::now();
        }
        self.cached_mb
    }
}

/// Run `spec` to completion under `job_id`, resuming from a stored
/// checkpoint if one exists. Returns `Err` only for terminal, pre-load
/// failures (bad configuration, unparseable source, retries exhausted); a
/// safety-limit cancellation is a normal `Ok` outcome recorded on the job.
pub async fn run_job(
    ctx: &PipelineContext,
    job_id: JobId,
    spec: JobSpec,
    cancellation: CancellationToken,
) -> Result<EtlResult, EtlError> {
    let start = Instant::now();
    let deadline = spec.safety_limits.max_duration_ms.map(Duration::from_millis);

    ctx.registry
        .register(EtlJob::new(job_id.clone(), spec.table.clone(), spec.source.type_name()))
        .await
        .map_err(|e| EtlError::config(e.to_string()))?;

    info!(stage = Stage::Planning.as_str(), "job starting");

    let span = etl_logging::job_span(job_id.as_str());
    let result = run_inner(ctx, &job_id, spec, cancellation, start, deadline).instrument(span).await;

    match &result {
        Ok(_) => {}
        Err(EtlError::Cancelled { reason }) => {
            let _ = ctx.registry.cancel(&job_id, Some(reason.clone())).await;
        }
        Err(err) => {
            let _ = ctx.registry.fail(&job_id, err.to_string()).await;
        }
    }
    result
}

async fn run_inner(
    ctx: &PipelineContext,
    job_id: &JobId,
    spec: JobSpec,
    cancellation: CancellationToken,
    start: Instant,
    deadline: Option<Duration>,
) -> Result<EtlResult, EtlError> {
    let schema = introspect_table(&ctx.pool, &spec.table).await?;
    let existing_checkpoint = ctx.checkpoints.load(job_id).await;
    let checkpoint_resumed = existing_checkpoint.is_some();

    let resume_state = existing_checkpoint.as_ref().map(|c| c.resume_state.clone());
    let mut source = open_source(&spec.source, cancellation.clone(), resume_state.as_ref())?;

    let mut attempted: u64 = existing_checkpoint.as_ref().map(|c| c.last_processed_index).unwrap_or(0);
    let mut pending_first: Option<etl_protocol::Record> = None;

    let column_plan = match &existing_checkpoint {
        Some(checkpoint) => checkpoint.column_plan.clone(),
        None => {
            let Some(first) = source.next_record().await? else {
                ctx.registry.complete(job_id).await.ok();
                return Ok(finish(&spec, job_id.clone(), checkpoint_resumed, 0, 0, 0, None, 0, Vec::new(), start));
            };
            let plan = build_column_plan(&first, &schema, spec.source_mapping.as_ref())?;
            pending_first = Some(first);
            plan
        }
    };

    let row_mapper = build_row_mapper(&spec.table, &column_plan, &schema);
    let mut dead_letters = DeadLetterCollector::new(job_id.clone(), ctx.dead_letter_dir.clone())
        .with_capacity(spec.dead_letter_buffer_capacity);

    info!(stage = Stage::Streaming.as_str(), columns = column_plan.len(), "column plan resolved");

    let mut total_inserted: u64 = 0;
    let mut total_rejected: u64 = 0;
    let mut last_checkpoint_attempted = attempted;
    let mut heap_sampler = HeapSampler::new();

    loop {
        let batch = read_batch(
            &mut source,
            &row_mapper,
            &mut pending_first,
            LOAD_CHUNK_ROWS,
            &mut attempted,
            &mut dead_letters,
            &mut total_rejected,
            spec.strict,
            &spec.safety_limits,
            start,
            deadline,
            &cancellation,
            &mut heap_sampler,
        )
        .await?;

        if !batch.lines.is_empty() {
            let inserted = load_batch(
                ctx,
                job_id,
                &spec,
                &column_plan,
                &schema,
                batch.lines,
                attempted,
                total_inserted,
                total_rejected,
                dead_letters.count(),
            )
            .await?;
            total_inserted += inserted;
        }

        ctx.registry.update_progress(job_id, attempted, total_inserted, total_rejected, dead_letters.count()).await.ok();

        let stopping = batch.exhausted || batch.cancelled || batch.limit_hit.is_some();
        if attempted - last_checkpoint_attempted >= etl_protocol::CHECKPOINT_INTERVAL_ROWS || stopping {
            let resume_state = source.resume_state().map(|v| ResumeState::Opaque(json_to_map(v))).unwrap_or_else(|| ResumeState::skip_rows(attempted));
            let checkpoint = Checkpoint::new(job_id.clone(), spec.table.clone(), attempted, resume_state, column_plan.clone());
            if let Err(e) = ctx.checkpoints.save(&checkpoint).await {
                warn!(error = %e, "failed to persist checkpoint; continuing without it");
            }
            last_checkpoint_attempted = attempted;
        }

        if batch.cancelled {
            return Err(EtlError::cancelled("cancellation requested"));
        }
        if let Some(limit) = batch.limit_hit {
            return Err(EtlError::cancelled(limit.reason()));
        }
        if batch.exhausted {
            break;
        }
    }

    info!(stage = Stage::Finalising.as_str(), "streaming complete");
    let (dead_letter_path, dead_letter_count) = dead_letters.flush().await.map_err(|e| EtlError::DeadLetterIo(e.to_string()))?;

    ctx.registry.complete(job_id).await.ok();
    let _ = ctx.checkpoints.delete(job_id).await;

    Ok(finish(
        &spec,
        job_id.clone(),
        checkpoint_resumed,
        attempted,
        total_inserted,
        total_rejected,
        dead_letter_path,
        dead_letter_count,
        column_plan.db_columns(),
        start,
    ))
}

struct Batch {
    lines: Vec<Vec<u8>>,
    exhausted: bool,
    cancelled: bool,
    limit_hit: Option<SafetyLimit>,
}

/// Accumulate up to `chunk_rows` encoded lines, checking cancellation and
/// every safety limit before each record so a limit trips at the exact row
/// boundary rather than at the end of a multi-thousand-row chunk.
#[allow(clippy::too_many_arguments)]
async fn read_batch(
    source: &mut Box<dyn RowSource>,
    mapper: &RowMapper,
    pending_first: &mut Option<etl_protocol::Record>,
    chunk_rows: u64,
    attempted: &mut u64,
    dead_letters: &mut DeadLetterCollector,
    rejected: &mut u64,
    strict: bool,
    limits: &SafetyLimits,
    start: Instant,
    deadline: Option<Duration>,
    cancellation: &CancellationToken,
    heap_sampler: &mut HeapSampler,
) -> Result<Batch, EtlError> {
    let mut lines = Vec::new();
    let mut exhausted = false;
    let mut cancelled = false;
    let mut limit_hit = None;

    while (lines.len() as u64) < chunk_rows {
        if cancellation.is_cancelled() {
            cancelled = true;
            break;
        }
        if let Some(max) = limits.max_rows {
            if *attempted >= max {
                limit_hit = Some(SafetyLimit::MaxRows);
                break;
            }
        }
        if let Some(limit) = deadline {
            if start.elapsed() >= limit {
                limit_hit = Some(SafetyLimit::MaxDurationMs);
                break;
            }
        }
        if let Some(max) = limits.max_dead_letters {
            if dead_letters.count() >= max {
                limit_hit = Some(SafetyLimit::MaxDeadLetters);
                break;
            }
        }
        if let Some(max) = limits.max_heap_mb {
            if heap_sampler.current_mb() >= max {
                limit_hit = Some(SafetyLimit::MaxHeapMb);
                break;
            }
        }

        let record = if let Some(record) = pending_first.take() {
            Some(record)
        } else {
            source.next_record().await?
        };

        let Some(record) = record else {
            exhausted = true;
            break;
        };
        *attempted += 1;

        match mapper.map(&record) {
            Ok(values) => {
                let fields: Vec<Option<String>> = values.iter().map(value_to_field).collect();
                lines.push(encode_line(&fields));
            }
            Err(err) if strict => {
                return Err(EtlError::InvalidRow { row_index: *attempted - 1, reason: err.to_string() });
            }
            Err(err) => {
                *rejected += 1;
                dead_letters.add(*attempted - 1, record, err.to_string());
                dead_letters.flush_if_over_capacity().await.map_err(|e| EtlError::DeadLetterIo(e.to_string()))?;
            }
        }
    }

    Ok(Batch { lines, exhausted, cancelled, limit_hit })
}

#[allow(clippy::too_many_arguments)]
async fn load_batch(
    ctx: &PipelineContext,
    job_id: &JobId,
    spec: &JobSpec,
    plan: &ColumnPlan,
    schema: &TableSchema,
    lines: Vec<Vec<u8>>,
    attempted: u64,
    inserted_before: u64,
    rejected: u64,
    dead_letter_count: u64,
) -> Result<u64, EtlError> {
    match &spec.load_mode {
        LoadMode::Parallel(options) => {
            parallel_bulk_load(&ctx.pool, &spec.table, plan, schema, lines, options).await.map_err(EtlError::from)
        }
        LoadMode::Streaming => {
            let options = load_options(spec);
            run_with_retry(&spec.retry_policy, || {
                let (tx, rx) = bounded_line_channel(spec.high_water_mark);
                let lines = lines.clone();
                let send_fut = async move {
                    for line in lines {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                };
                let line_stream = Box::pin(futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|line| (line, rx)) }));

                // Bridge the loader's synchronous `on_progress` callback, which
                // fires at `options.progress_interval` cadence, onto the async
                // job registry: a plain channel since `update_progress` can't
                // be awaited from inside a `FnMut`.
                let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<u64>();
                let on_progress = move |streamed: u64| {
                    let _ = progress_tx.send(streamed);
                };
                let progress_task = async move {
                    while let Some(streamed) = progress_rx.recv().await {
                        ctx.registry
                            .update_progress(job_id, attempted, inserted_before + streamed, rejected, dead_letter_count)
                            .await
                            .ok();
                    }
                };

                let load_fut = bulk_load(&ctx.pool, &spec.table, plan, schema, line_stream, &options, on_progress);
                async move {
                    let (_, _, result) = tokio::join!(send_fut, progress_task, load_fut);
                    result
                }
            })
            .await
            .map_err(EtlError::from)
        }
    }
}

fn load_options(spec: &JobSpec) -> LoadOptions {
    match spec.conflict {
        etl_protocol::plan::ConflictPolicy::Error => LoadOptions::error(),
        etl_protocol::plan::ConflictPolicy::Nothing => LoadOptions::nothing(),
        etl_protocol::plan::ConflictPolicy::Upsert => {
            let mut options = LoadOptions::upsert(spec.upsert_key_columns.clone());
            options.upsert_update_columns = spec.upsert_update_columns.clone();
            options
        }
    }
}

fn open_source(
    source: &SourceSpec,
    cancellation: CancellationToken,
    resume: Option<&ResumeState>,
) -> Result<Box<dyn RowSource>, EtlError> {
    match source {
        SourceSpec::Csv(options) => {
            let mut options = options.clone();
            if let Some(skip) = resume.and_then(ResumeState::as_skip_rows) {
                options = options.with_skip_rows(skip);
            }
            Ok(Box::new(CsvSource::open(options, cancellation)?))
        }
        SourceSpec::Json(options) => {
            let mut options = options.clone();
            if let Some(skip) = resume.and_then(ResumeState::as_skip_rows) {
                options = options.with_skip_rows(skip);
            }
            Ok(Box::new(JsonSource::open(options, cancellation)?))
        }
        SourceSpec::Api(options) => {
            let mut api = ApiSource::new(options.clone(), cancellation)?;
            if let Some(url) = resume.and_then(ResumeState::as_next_url) {
                api.resume_from(Some(url.to_string()));
            }
            Ok(Box::new(api))
        }
    }
}

fn build_row_mapper(table: &str, plan: &ColumnPlan, schema: &TableSchema) -> RowMapper {
    let columns = plan
        .mappings()
        .iter()
        .map(|mapping| {
            let column = schema.get(&mapping.db_column);
            let data_type = column.map(|c| c.data_type.as_str()).unwrap_or("text");
            let nullable = column.map(|c| c.is_nullable).unwrap_or(true);
            ColumnSpec {
                source_key: mapping.source_key.clone(),
                db_column: mapping.db_column.clone(),
                kind: etl_transform::coerce::ColumnKind::from_db_column(&mapping.db_column, data_type),
                nullable,
            }
        })
        .collect();
    RowMapper::new(table, columns)
}

fn json_to_map(value: serde_json::Value) -> std::collections::HashMap<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        other => {
            let mut map = std::collections::HashMap::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn finish(
    spec: &JobSpec,
    job_id: JobId,
    checkpoint_resumed: bool,
    attempted: u64,
    inserted: u64,
    rejected: u64,
    dead_letter_path: Option<String>,
    dead_letter_count: u64,
    columns: Vec<String>,
    start: Instant,
) -> EtlResult {
    let duration_ms = start.elapsed().as_millis() as u64;
    let rows_per_second = if duration_ms == 0 { attempted as f64 } else { attempted as f64 / (duration_ms as f64 / 1000.0) };
    EtlResult {
        table: spec.table.clone(),
        duration_ms,
        attempted_rows: attempted,
        inserted_rows: inserted,
        rejected_rows: rejected,
        rows_per_second,
        source_type: spec.source.type_name().to_string(),
        columns,
        job_id: Some(job_id),
        checkpoint_resumed: Some(checkpoint_resumed),
        dead_letter_path,
        dead_letter_count: Some(dead_letter_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use etl_transform::coerce::ColumnKind;

    #[test]
    fn stage_names_are_lowercase() {
        assert_eq!(Stage::Planning.as_str(), "planning");
        assert_eq!(Stage::Streaming.as_str(), "streaming");
        assert_eq!(Stage::Finalising.as_str(), "finalising");
    }

    #[test]
    fn rows_per_second_handles_zero_duration() {
        let spec = JobSpec::new("orders", SourceSpec::Csv(etl_sources::CsvSourceOptions::new("x.csv")));
        let result = finish(&spec, JobId::new("j"), false, 100, 100, 0, None, 0, Vec::new(), Instant::now());
        assert!(result.rows_per_second >= 100.0);
    }

    struct VecSource(std::vec::IntoIter<etl_protocol::Record>);

    #[async_trait]
    impl RowSource for VecSource {
        async fn next_record(&mut self) -> Result<Option<etl_protocol::Record>, EtlError> {
            Ok(self.0.next())
        }
    }

    fn mapper() -> RowMapper {
        RowMapper::new(
            "orders",
            vec![ColumnSpec { source_key: "order_number".into(), db_column: "order_number".into(), kind: ColumnKind::Integer, nullable: false }],
        )
    }

    fn no_limits() -> SafetyLimits {
        SafetyLimits::default()
    }

    #[tokio::test]
    async fn strict_mode_aborts_on_first_bad_row() {
        let records = vec![
            etl_protocol::Record::from_raw_pairs(vec![("order_number", "1")]),
            etl_protocol::Record::from_raw_pairs(vec![("order_number", "not-a-number")]),
        ];
        let mut source: Box<dyn RowSource> = Box::new(VecSource(records.into_iter()));
        let mapper = mapper();
        let mut pending_first = None;
        let mut attempted = 0u64;
        let mut rejected = 0u64;
        let dir = tempfile::tempdir().unwrap();
        let mut dead_letters = DeadLetterCollector::new(JobId::new("strict-job"), dir.path());
        let cancellation = CancellationToken::new();
        let mut heap_sampler = HeapSampler::new();

        let err = read_batch(
            &mut source,
            &mapper,
            &mut pending_first,
            10,
            &mut attempted,
            &mut dead_letters,
            &mut rejected,
            true,
            &no_limits(),
            Instant::now(),
            None,
            &cancellation,
            &mut heap_sampler,
        )
        .await
        .unwrap_err();

        match err {
            EtlError::InvalidRow { row_index, .. } => assert_eq!(row_index, 1),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rejected, 0, "strict mode must not dead-letter, it aborts instead");
    }

    #[tokio::test]
    async fn non_strict_mode_dead_letters_bad_rows_and_continues() {
        let records = vec![
            etl_protocol::Record::from_raw_pairs(vec![("order_number", "1")]),
            etl_protocol::Record::from_raw_pairs(vec![("order_number", "not-a-number")]),
            etl_protocol::Record::from_raw_pairs(vec![("order_number", "3")]),
        ];
        let mut source: Box<dyn RowSource> = Box::new(VecSource(records.into_iter()));
        let mapper = mapper();
        let mut pending_first = None;
        let mut attempted = 0u64;
        let mut rejected = 0u64;
        let dir = tempfile::tempdir().unwrap();
        let mut dead_letters = DeadLetterCollector::new(JobId::new("lenient-job"), dir.path());
        let cancellation = CancellationToken::new();
        let mut heap_sampler = HeapSampler::new();

        let batch = read_batch(
            &mut source,
            &mapper,
            &mut pending_first,
            10,
            &mut attempted,
            &mut dead_letters,
            &mut rejected,
            false,
            &no_limits(),
            Instant::now(),
            None,
            &cancellation,
            &mut heap_sampler,
        )
        .await
        .unwrap();

        assert_eq!(batch.lines.len(), 2);
        assert_eq!(rejected, 1);
        assert_eq!(dead_letters.count(), 1);
    }

    #[tokio::test]
    async fn max_rows_limit_stops_at_exact_boundary() {
        let records = (1..=10)
            .map(|n| etl_protocol::Record::from_raw_pairs(vec![("order_number", n.to_string())]))
            .collect::<Vec<_>>();
        let mut source: Box<dyn RowSource> = Box::new(VecSource(records.into_iter()));
        let mapper = mapper();
        let mut pending_first = None;
        let mut attempted = 0u64;
        let mut rejected = 0u64;
        let dir = tempfile::tempdir().unwrap();
        let mut dead_letters = DeadLetterCollector::new(JobId::new("bounded-job"), dir.path());
        let cancellation = CancellationToken::new();
        let mut heap_sampler = HeapSampler::new();
        let limits = SafetyLimits { max_rows: Some(2), ..SafetyLimits::default() };

        // Chunk size (100) is far larger than the source (10 rows) and the
        // limit (2 rows), mirroring the gap the boundary test guards against:
        // a limit far smaller than one chunk must still stop exactly on time.
        let batch = read_batch(
            &mut source,
            &mapper,
            &mut pending_first,
            100,
            &mut attempted,
            &mut dead_letters,
            &mut rejected,
            false,
            &limits,
            Instant::now(),
            None,
            &cancellation,
            &mut heap_sampler,
        )
        .await
        .unwrap();

        assert_eq!(attempted, 2);
        assert_eq!(batch.lines.len(), 2);
        assert_eq!(batch.limit_hit, Some(SafetyLimit::MaxRows));
        assert!(!batch.exhausted);
    }

    #[tokio::test]
    async fn cancellation_stops_before_the_next_record() {
        let records = vec![
            etl_protocol::Record::from_raw_pairs(vec![("order_number", "1")]),
            etl_protocol::Record::from_raw_pairs(vec![("order_number", "2")]),
        ];
        let mut source: Box<dyn RowSource> = Box::new(VecSource(records.into_iter()));
        let mapper = mapper();
        let mut pending_first = None;
        let mut attempted = 0u64;
        let mut rejected = 0u64;
        let dir = tempfile::tempdir().unwrap();
        let mut dead_letters = DeadLetterCollector::new(JobId::new("cancel-job"), dir.path());
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let mut heap_sampler = HeapSampler::new();

        let batch = read_batch(
            &mut source,
            &mapper,
            &mut pending_first,
            100,
            &mut attempted,
            &mut dead_letters,
            &mut rejected,
            false,
            &no_limits(),
            Instant::now(),
            None,
            &cancellation,
            &mut heap_sampler,
        )
        .await
        .unwrap();

        assert!(batch.cancelled);
        assert_eq!(batch.lines.len(), 0);
        assert_eq!(attempted, 0);
    }
}
