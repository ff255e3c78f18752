//! Service assembly.
//!
//! Builds the collaborators from a [`LoaderConfig`] and wires the subscriber,
//! the worker pool, the completion router and the dead-letter sink around one
//! cancellation token.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, LoaderConfig};
use crate::extract::{KeyValueExtractor, KeyValueSource, RedisSource};
use crate::load::{MemoryResultStore, PgResultStore, ResultStore, TableLoader};
use crate::metrics::{export_metrics, init_metrics};
use crate::quiz::{FileQuestionSets, Quiz};
use crate::scheduler::{
    route_completions, run_dead_letter_sink, DeadLetterSink, JobPipeline, LogDeadLetterSink,
    PoolStats, WorkerPool, WorkerPoolConfig,
};
use crate::subscribe::{MessageSource, RedisListSource, Subscriber};

/// What a finished service run did.
#[derive(Debug, Clone)]
pub struct ServiceReport {
    pub stats: PoolStats,
    pub dead_letters: usize,
}

/// Builds the job pipeline over the given backends.
///
/// # Errors
///
/// Returns `ConfigError` if the configured result table is not a valid name.
pub fn build_pipeline(
    config: &LoaderConfig,
    source: Arc<dyn KeyValueSource>,
    store: Arc<dyn ResultStore>,
) -> Result<JobPipeline, ConfigError> {
    let table = config.table_name()?;

    let question_sets = Arc::new(FileQuestionSets::new(config.question_set_path.clone()));
    let extractor =
        Arc::new(KeyValueExtractor::new(source).with_deadline(config.extract_deadline));
    let loader = Arc::new(TableLoader::new(store, table));

    Ok(JobPipeline::new(question_sets, extractor, loader))
}

/// Runs the pipeline until `cancel` fires, then drains everything in order:
/// subscriber, workers, completion router, dead-letter sink.
///
/// # Errors
///
/// Returns an error if the worker pool cannot be started.
pub async fn run_service(
    config: &LoaderConfig,
    source: Arc<dyn MessageSource>,
    pipeline: Arc<JobPipeline>,
    sink: Arc<dyn DeadLetterSink>,
    cancel: CancellationToken,
) -> anyhow::Result<ServiceReport> {
    let (job_tx, job_rx) = flume::bounded(config.job_queue_capacity);
    let (done_tx, done_rx) = mpsc::channel(config.report_queue_capacity);
    let (dead_tx, dead_rx) = mpsc::channel(config.report_queue_capacity);

    let router = tokio::spawn(route_completions(done_rx, dead_tx));
    let sink_task = tokio::spawn(run_dead_letter_sink(dead_rx, sink));

    let pool_config = WorkerPoolConfig::new(config.worker_count)
        .with_shutdown_timeout(config.shutdown_timeout);
    let mut pool = WorkerPool::new(pool_config, pipeline, job_rx, done_tx, cancel.clone());
    pool.start().context("Failed to start worker pool")?;

    let subscriber = Subscriber::new(source).with_poll_interval(config.poll_interval);
    let mut subscriber_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { subscriber.run(job_tx, cancel).await }
    });

    info!(
        workers = pool.num_workers(),
        job_queue_capacity = config.job_queue_capacity,
        "Quiz result loader running"
    );

    let finished_early = tokio::select! {
        _ = cancel.cancelled() => None,
        result = &mut subscriber_task => Some(result),
    };

    let subscribed = match finished_early {
        Some(result) => {
            // The subscriber only stops on its own when something is wrong
            cancel.cancel();
            result
        }
        None => subscriber_task.await,
    };
    match subscribed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Subscriber stopped with an error"),
        Err(e) => error!(error = %e, "Subscriber task panicked"),
    }

    if pool.is_running() {
        if let Err(e) = pool.shutdown().await {
            warn!(error = %e, "Worker pool did not shut down cleanly");
        }
    }
    let stats = pool.stats();
    drop(pool);

    let routed = router.await.unwrap_or_else(|e| {
        error!(error = %e, "Completion router panicked");
        0
    });
    let dead_letters = sink_task.await.unwrap_or_else(|e| {
        error!(error = %e, "Dead-letter sink panicked");
        0
    });

    info!(
        completed = stats.jobs_completed,
        routed,
        failed = stats.jobs_failed,
        abandoned = stats.jobs_abandoned,
        dead_letters,
        success_rate = stats.success_rate(),
        "Quiz result loader stopped"
    );

    Ok(ServiceReport {
        stats,
        dead_letters,
    })
}

/// Runs the long-lived service against Redis and PostgreSQL until Ctrl-C.
pub async fn serve(config: &LoaderConfig) -> anyhow::Result<ServiceReport> {
    if let Err(e) = init_metrics() {
        warn!(error = %e, "Failed to initialize metrics");
    }

    let source = RedisSource::connect(&config.redis_url)
        .await
        .context("Failed to connect to the quiz data store")?;
    let store = PgResultStore::connect(&config.database_url)
        .await
        .context("Failed to connect to the result store")?;
    let events = RedisListSource::connect(&config.redis_url, &config.event_queue)
        .await
        .context("Failed to connect to the event queue")?;

    let pipeline = build_pipeline(config, Arc::new(source), Arc::new(store))?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
            }
            cancel.cancel();
        }
    });

    let report = run_service(
        config,
        Arc::new(events),
        Arc::new(pipeline),
        Arc::new(LogDeadLetterSink),
        cancel,
    )
    .await?;

    debug!(metrics = %export_metrics(), "Final metrics");
    Ok(report)
}

/// Processes one quiz immediately.
///
/// With `dry_run` the result goes to an in-memory store, nothing is cleaned
/// up, and the combined quiz is returned.
pub async fn process_once(
    config: &LoaderConfig,
    quiz_id: &str,
    dry_run: bool,
) -> anyhow::Result<Option<Quiz>> {
    let source = RedisSource::connect(&config.redis_url)
        .await
        .context("Failed to connect to the quiz data store")?;
    let cancel = CancellationToken::new();

    if dry_run {
        let store: Arc<dyn ResultStore> = Arc::new(MemoryResultStore::new());
        let pipeline = build_pipeline(config, Arc::new(source), store)?;
        let quiz = pipeline.execute(quiz_id, &cancel).await?;
        return Ok(Some(quiz));
    }

    let store = PgResultStore::connect(&config.database_url)
        .await
        .context("Failed to connect to the result store")?;
    let pipeline = build_pipeline(config, Arc::new(source), Arc::new(store))?;
    pipeline.process(quiz_id, &cancel).await?;
    info!(quiz_id = %quiz_id, "Quiz processed");
    Ok(None)
}

/// Publishes a quiz-complete event onto the configured event list.
pub async fn publish(config: &LoaderConfig, quiz_id: &str) -> anyhow::Result<()> {
    let events = RedisListSource::connect(&config.redis_url, &config.event_queue)
        .await
        .context("Failed to connect to the event queue")?;
    events.publish(quiz_id).await?;
    info!(quiz_id = %quiz_id, queue = %events.queue_name(), "Published quiz-complete event");
    Ok(())
}
