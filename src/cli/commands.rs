//! CLI command definitions for quiz-result-loader.

use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::config::LoaderConfig;
use crate::service;

/// Loads completed quizzes from the live store into the result store.
#[derive(Parser, Debug)]
#[command(name = "quiz-result-loader")]
#[command(about = "Extract completed quizzes, merge them with their questions and store the results")]
#[command(version)]
#[command(
    long_about = "quiz-result-loader listens for quiz-complete events, extracts the finished quiz from Redis,\nmerges it with its question set and upserts the result into PostgreSQL.\n\nSettings come from environment variables (REDIS_URL, DATABASE_URL, RESULT_TABLE, ...).\n\nExample usage:\n  quiz-result-loader serve --workers 4\n  quiz-result-loader process quiz-42 --dry-run"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the loader service until Ctrl-C.
    Serve(ServeArgs),

    /// Run the full job for one quiz and exit.
    Process(ProcessArgs),

    /// Publish a quiz-complete event for a quiz.
    Publish(PublishArgs),
}

/// Arguments for `quiz-result-loader serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Number of workers (overrides WORKER_COUNT).
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Event list to consume (overrides EVENT_QUEUE).
    #[arg(long)]
    pub queue: Option<String>,

    /// Extraction deadline in milliseconds (overrides EXTRACT_DEADLINE_MS).
    #[arg(long)]
    pub extract_deadline_ms: Option<u64>,
}

/// Arguments for `quiz-result-loader process`.
#[derive(Parser, Debug)]
pub struct ProcessArgs {
    /// Quiz to process.
    pub quiz_id: String,

    /// Store into memory, skip cleanup and print the combined quiz as JSON.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for `quiz-result-loader publish`.
#[derive(Parser, Debug)]
pub struct PublishArgs {
    /// Quiz that completed.
    pub quiz_id: String,

    /// Event list to publish to (overrides EVENT_QUEUE).
    #[arg(long)]
    pub queue: Option<String>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI args (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = LoaderConfig::from_env()?;

    match cli.command {
        Commands::Serve(args) => run_serve_command(config, args).await,
        Commands::Process(args) => run_process_command(config, args).await,
        Commands::Publish(args) => run_publish_command(config, args).await,
    }
}

async fn run_serve_command(mut config: LoaderConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(workers) = args.workers {
        config = config.with_worker_count(workers);
    }
    if let Some(queue) = args.queue {
        config = config.with_event_queue(queue);
    }
    if let Some(millis) = args.extract_deadline_ms {
        config = config.with_extract_deadline(Duration::from_millis(millis));
    }
    config.validate()?;

    info!(
        workers = config.worker_count,
        queue = %config.event_queue,
        table = %config.result_table,
        "Starting quiz result loader"
    );

    let report = service::serve(&config).await?;
    info!(
        completed = report.stats.jobs_completed,
        failed = report.stats.jobs_failed,
        dead_letters = report.dead_letters,
        "Shutdown complete"
    );
    Ok(())
}

async fn run_process_command(config: LoaderConfig, args: ProcessArgs) -> anyhow::Result<()> {
    let combined = service::process_once(&config, &args.quiz_id, args.dry_run).await?;
    if let Some(quiz) = combined {
        println!("{}", serde_json::to_string_pretty(&quiz)?);
    }
    Ok(())
}

async fn run_publish_command(mut config: LoaderConfig, args: PublishArgs) -> anyhow::Result<()> {
    if let Some(queue) = args.queue {
        config = config.with_event_queue(queue);
    }
    config.validate()?;
    service::publish(&config, &args.quiz_id).await
}
