//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by the result loader and
//! provides functions for initializing, registering, and exporting them.

use prometheus::{CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all result loader metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of jobs processed, labeled by outcome and failed step.
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Job processing duration in seconds.
pub static JOB_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Total dead letters emitted, labeled by failed step.
pub static DEAD_LETTERS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total inbound events dropped by the subscriber, labeled by reason.
pub static DROPPED_EVENTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total best-effort cleanup failures, labeled by target.
pub static CLEANUP_FAILURES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Number of workers currently processing a job.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls build a fresh registry but leave the
/// already-installed statics untouched.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let jobs_total = CounterVec::new(
        Opts::new(
            "quiz_result_loader_jobs_total",
            "Total number of quiz jobs processed",
        ),
        &["outcome", "step"],
    )?;

    let job_duration = Histogram::with_opts(
        HistogramOpts::new(
            "quiz_result_loader_job_duration_seconds",
            "Quiz job processing duration in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )?;

    let dead_letters_total = CounterVec::new(
        Opts::new(
            "quiz_result_loader_dead_letters_total",
            "Total dead letters emitted",
        ),
        &["step"],
    )?;

    let dropped_events_total = CounterVec::new(
        Opts::new(
            "quiz_result_loader_dropped_events_total",
            "Total inbound events dropped without a job",
        ),
        &["reason"],
    )?;

    let cleanup_failures_total = CounterVec::new(
        Opts::new(
            "quiz_result_loader_cleanup_failures_total",
            "Total best-effort cleanup failures",
        ),
        &["target"],
    )?;

    let active_workers = Gauge::new(
        "quiz_result_loader_active_workers",
        "Number of workers currently processing a job",
    )?;

    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(dead_letters_total.clone()))?;
    registry.register(Box::new(dropped_events_total.clone()))?;
    registry.register(Box::new(cleanup_failures_total.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = DEAD_LETTERS_TOTAL.set(dead_letters_total);
    let _ = DROPPED_EVENTS_TOTAL.set(dropped_events_total);
    let _ = CLEANUP_FAILURES_TOTAL.set(cleanup_failures_total);
    let _ = ACTIVE_WORKERS.set(active_workers);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead when the registry has not been initialized
/// or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
