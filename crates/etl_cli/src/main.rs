//! Command-line harness for the streaming ETL core.
//!
//! Usage:
//!     etl run --job orders.json --job-id orders-2026-07-30

mod config;
mod job_file;

use clap::{Parser, Subcommand};
use config::SystemConfig;
use etl_db::{create_pool, DbConfig};
use etl_logging::LogConfig;
use etl_orchestrator::{CheckpointStore, JobRegistry, PipelineContext};
use etl_protocol::{CancellationToken, JobId};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "etl", about = "Streaming ETL core: run jobs against a live Postgres schema")]
struct Cli {
    /// Directory tracing writes rolling log files to, in addition to stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one job described by a JSON/YAML file to completion.
    Run {
        /// Path to the job description file.
        #[arg(long)]
        job: PathBuf,

        /// Job identifier. A fresh UUID is minted when omitted; supply the
        /// same id as a prior failed run to resume from its checkpoint.
        #[arg(long)]
        job_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    etl_logging::init_logging(
        LogConfig::new("etl")
            .with_verbose(cli.verbose)
            .with_log_dir(cli.log_dir.unwrap_or_else(|| PathBuf::from("./etl_logs"))),
    )?;

    match cli.command {
        Command::Run { job, job_id } => run(job, job_id).await,
    }
}

async fn run(job_path: PathBuf, job_id: Option<String>) -> anyhow::Result<()> {
    let config = SystemConfig::from_env()?;
    let job_file = job_file::load(&job_path)?;
    let mut spec = job_file.into_job_spec()?;
    spec.safety_limits.merge_defaults(&config.default_limits);

    let pool = create_pool(
        DbConfig::new(config.database_url.clone()).with_max_connections(config.max_connections),
    )
    .await?;

    let ctx = PipelineContext {
        pool,
        registry: JobRegistry::new(),
        checkpoints: CheckpointStore::new(config.checkpoint_dir),
        dead_letter_dir: config.dead_letter_dir,
    };

    let job_id = job_id.map(JobId::new).unwrap_or_else(JobId::generate);
    let cancellation = CancellationToken::new();

    let shutdown_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt signal, cancelling job");
            shutdown_token.cancel();
        }
    });

    tracing::info!(job_id = job_id.as_str(), table = %spec.table, "starting job");
    let result = etl_orchestrator::run_job(&ctx, job_id, spec, cancellation).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
