// serptrace-cli/src/main.rs
// ============================================================================
// Module: Serptrace CLI Entry Point
// Description: Command dispatcher for running the search-transparency
//              pipeline, once or on a schedule.
// Purpose: Thin wiring layer; all business logic lives in serptrace-runner.
// Dependencies: clap, serptrace-runner, serptrace-store-sqlite, tokio,
//               tracing, tracing-subscriber.
// ============================================================================

//! ## Overview
//! Two subcommands: `run` starts the scheduler and blocks until interrupted,
//! `run-once` performs a single pipeline run and exits with a code
//! reflecting success or failure. Both load the same [`RunnerConfig`], open
//! the same SQLite storage backend, and select between [`NoopStagePort`] and
//! [`ScriptStagePort`] per configured stage command.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serptrace_core::storage::Storage;
use serptrace_runner::AnnotationPort;
use serptrace_runner::CollectorPort;
use serptrace_runner::MetricsPort;
use serptrace_runner::NoopStagePort;
use serptrace_runner::Runner;
use serptrace_runner::RunnerConfig;
use serptrace_runner::ScriptStagePort;
use serptrace_runner::Scheduler;
use serptrace_store_sqlite::SqliteStore;
use serptrace_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "serptrace", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the scheduler and run the pipeline on its configured cadence.
    Run(CommonArgs),
    /// Run the pipeline once and exit.
    RunOnce(CommonArgs),
}

/// Arguments shared by both subcommands.
#[derive(Args, Debug)]
struct CommonArgs {
    /// Optional config file path (defaults to `serptrace.toml` or the
    /// `SERPTRACE_CONFIG` environment variable).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Error type wrapping every fallible step of CLI startup.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] serptrace_runner::error::ConfigError),
    /// The SQLite storage backend could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] serptrace_store_sqlite::SqliteStoreError),
    /// A signal handler could not be installed.
    #[error("signal handling error: {0}")]
    Signal(#[from] std::io::Error),
}

type CliResult<T> = Result<T, CliError>;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    install_tracing();
    match run().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "serptrace exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => command_run(args).await,
        Command::RunOnce(args) => command_run_once(args).await,
    }
}

async fn command_run(args: CommonArgs) -> CliResult<ExitCode> {
    let config = RunnerConfig::load(args.config.as_deref())?;
    let cron_expression = config.cron_expression.clone();
    let timezone = config.timezone.clone();
    let run_on_start = config.run_on_start;

    let runner = Arc::new(build_runner(config)?);
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&runner), &cron_expression, &timezone, run_on_start)?);
    scheduler.start();

    tracing::info!("serptrace scheduler running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, stopping scheduler");
    scheduler.stop().await;

    Ok(ExitCode::SUCCESS)
}

async fn command_run_once(args: CommonArgs) -> CliResult<ExitCode> {
    let config = RunnerConfig::load(args.config.as_deref())?;
    let runner = build_runner(config)?;
    match runner.run_once().await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            tracing::error!(error = %err, "pipeline run failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn build_runner(config: RunnerConfig) -> CliResult<Runner> {
    let storage_config = SqliteStoreConfig::new(config.storage.path.clone());
    let storage_config = SqliteStoreConfig { busy_timeout_ms: config.storage.busy_timeout_ms, ..storage_config };
    let storage = SqliteStore::open(storage_config)?;
    let storage: Arc<dyn Storage> = Arc::new(storage);

    let collector_port = build_port(config.collector_command.clone());
    let annotation_port = build_port(config.annotation_command.clone());
    let metrics_port = build_port(config.metrics_command.clone());

    Ok(Runner::new(storage, config, collector_port, annotation_port, metrics_port))
}

/// Selects [`ScriptStagePort`] when an external command is configured, or
/// [`NoopStagePort`] otherwise. The returned `Arc` satisfies all three stage
/// port traits, whichever the caller needs.
fn build_port(command: Option<Vec<String>>) -> Arc<AnyStagePort> {
    match command {
        Some(argv) => Arc::new(AnyStagePort::Script(ScriptStagePort::new(argv))),
        None => Arc::new(AnyStagePort::Noop(NoopStagePort)),
    }
}

/// Dispatches to either stage port implementation without exposing a
/// trait-object-per-call-site split at the construction site.
enum AnyStagePort {
    /// No external command configured for this stage.
    Noop(NoopStagePort),
    /// An external command configured for this stage.
    Script(ScriptStagePort),
}

#[async_trait]
impl CollectorPort for AnyStagePort {
    async fn run_collection(
        &self,
        ctx: &serptrace_runner::ports::CollectorContext,
    ) -> Result<(), serptrace_runner::error::CollectorPortError> {
        match self {
            Self::Noop(port) => port.run_collection(ctx).await,
            Self::Script(port) => port.run_collection(ctx).await,
        }
    }
}

#[async_trait]
impl AnnotationPort for AnyStagePort {
    async fn run_annotation(
        &self,
        ctx: &serptrace_runner::ports::AnnotationContext,
    ) -> Result<(), serptrace_runner::error::AnnotationPortError> {
        match self {
            Self::Noop(port) => port.run_annotation(ctx).await,
            Self::Script(port) => port.run_annotation(ctx).await,
        }
    }
}

#[async_trait]
impl MetricsPort for AnyStagePort {
    async fn run_metrics(
        &self,
        ctx: &serptrace_runner::ports::MetricsContext,
    ) -> Result<(), serptrace_runner::error::MetricsPortError> {
        match self {
            Self::Noop(port) => port.run_metrics(ctx).await,
            Self::Script(port) => port.run_metrics(ctx).await,
        }
    }
}

fn install_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}
