//! Worker pool for processing quiz jobs from a shared queue.
//!
//! Each worker runs as an independent async task pulling quiz ids from one
//! bounded MPMC queue and driving them through the [`JobPipeline`]. Every
//! finished job produces one [`CompleteJob`] on the completion channel.
//!
//! # Features
//!
//! - Configurable number of workers
//! - Cancellation through a shared `CancellationToken`
//! - Jobs in flight at cancellation are abandoned without a report
//! - Pool statistics tracking

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job::{CompleteJob, JobError};
use super::pipeline::JobPipeline;
use crate::error::ExtractError;
use crate::metrics::MetricsCollector;

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool has already been started.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// A pool needs at least one worker.
    #[error("Pool needs at least one worker")]
    NoWorkers,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 10,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently processing jobs.
    pub active_workers: usize,
    /// Total number of jobs completed successfully.
    pub jobs_completed: u64,
    /// Total number of jobs that failed.
    pub jobs_failed: u64,
    /// Jobs dropped mid-flight by cancellation.
    pub jobs_abandoned: u64,
    /// Average job processing duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of jobs processed (completed + failed).
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_completed as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_abandoned: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_abandoned: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_abandoned(&self) {
        self.jobs_abandoned.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let active = self.active_workers.load(Ordering::SeqCst);

        let total_jobs = completed + failed;
        let average_duration = if total_jobs > 0 {
            Duration::from_millis(total_duration_ms / total_jobs)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: active as usize,
            jobs_completed: completed,
            jobs_failed: failed,
            jobs_abandoned: self.jobs_abandoned.load(Ordering::SeqCst),
            average_job_duration: average_duration,
        }
    }
}

/// Fixed-size pool of workers sharing one job queue.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    pipeline: Arc<JobPipeline>,
    jobs: flume::Receiver<String>,
    /// Handed to the workers on start so the channel closes once they exit.
    completions: Option<mpsc::Sender<CompleteJob>>,
    cancel: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    is_running: AtomicBool,
}

impl WorkerPool {
    /// Creates a pool that is not yet running.
    ///
    /// # Arguments
    ///
    /// * `config` - Pool configuration
    /// * `pipeline` - Step sequence run for every job
    /// * `jobs` - Receiving end of the shared job queue
    /// * `completions` - Where every finished job is reported
    /// * `cancel` - Stops the workers when cancelled
    pub fn new(
        config: WorkerPoolConfig,
        pipeline: Arc<JobPipeline>,
        jobs: flume::Receiver<String>,
        completions: mpsc::Sender<CompleteJob>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            pipeline,
            jobs,
            completions: Some(completions),
            cancel,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Spawns all workers. A pool can only be started once.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the pool was started before and
    /// `PoolError::NoWorkers` if configured with zero workers.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.config.num_workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        let Some(completions) = self.completions.take() else {
            return Err(PoolError::AlreadyRunning);
        };

        for num in 0..self.config.num_workers {
            let worker = Worker {
                num,
                pipeline: Arc::clone(&self.pipeline),
                jobs: self.jobs.clone(),
                completions: completions.clone(),
                cancel: self.cancel.clone(),
                stats: Arc::clone(&self.stats),
                metrics: MetricsCollector::new(),
            };
            self.worker_handles.push(tokio::spawn(worker.run()));
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(num_workers = self.config.num_workers, "Worker pool started");
        Ok(())
    }

    /// Waits for every worker to exit on its own, which happens once the job
    /// queue is closed and drained or the token is cancelled.
    pub async fn join(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        while let Some(handle) = self.worker_handles.pop() {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Worker pool stopped");
        Ok(())
    }

    /// Cancels all workers and waits for them to exit.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ShutdownTimeout` if workers don't stop within
    /// the configured timeout.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!("Initiating worker pool shutdown");
        self.cancel.cancel();

        let timeout = self.config.shutdown_timeout;
        let joined = tokio::time::timeout(timeout, self.join()).await;
        match joined {
            Ok(result) => result,
            Err(_) => {
                self.is_running.store(false, Ordering::SeqCst);
                for handle in self.worker_handles.drain(..) {
                    handle.abort();
                }
                Err(PoolError::ShutdownTimeout(timeout))
            }
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    /// Returns whether the pool is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Returns the number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }
}

/// A single worker that processes jobs from the queue.
struct Worker {
    num: usize,
    pipeline: Arc<JobPipeline>,
    jobs: flume::Receiver<String>,
    completions: mpsc::Sender<CompleteJob>,
    cancel: CancellationToken,
    stats: Arc<SharedPoolStats>,
    metrics: MetricsCollector,
}

impl Worker {
    /// Main worker loop. Runs until cancelled or the job queue closes.
    async fn run(self) {
        debug!(worker = self.num, "Worker started");

        loop {
            let quiz_id = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                job = self.jobs.recv_async() => match job {
                    Ok(quiz_id) => quiz_id,
                    // Every sender is gone and the queue is drained
                    Err(_) => break,
                },
            };

            if !self.process_job(quiz_id).await {
                break;
            }
        }

        info!(worker = self.num, "Worker stopped");
    }

    /// Processes one job. Returns false if the job was abandoned because the
    /// worker was cancelled.
    async fn process_job(&self, quiz_id: String) -> bool {
        info!(worker = self.num, quiz_id = %quiz_id, "Worker started processing quiz");
        let start_time = Instant::now();

        self.stats.increment_active();
        self.metrics.inc_active_workers();

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.pipeline.process(&quiz_id, &self.cancel) => Some(result),
        };

        self.stats.decrement_active();
        self.metrics.dec_active_workers();
        let duration = start_time.elapsed();

        let report = match result {
            None | Some(Err(JobError::Extract(ExtractError::Cancelled))) => {
                self.stats.record_abandoned();
                warn!(worker = self.num, quiz_id = %quiz_id, "Abandoned quiz on cancellation");
                return false;
            }
            Some(Ok(())) => {
                self.stats.record_completion(duration);
                self.metrics
                    .record_job("success", "none", duration.as_secs_f64());
                CompleteJob::success(quiz_id, self.num, duration)
            }
            Some(Err(e)) => {
                self.stats.record_failure(duration);
                self.metrics
                    .record_job("failure", e.step().as_str(), duration.as_secs_f64());
                CompleteJob::failure(quiz_id, self.num, duration, e)
            }
        };

        if self.completions.send(report).await.is_err() {
            warn!(worker = self.num, "Completion channel closed, report dropped");
        }
        true
    }
}
