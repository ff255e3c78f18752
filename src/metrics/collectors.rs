//! Recording facade over the raw Prometheus metrics.
//!
//! Every method is a no-op until `init_metrics()` has run, so library code
//! can record unconditionally.

use super::prometheus::{
    ACTIVE_WORKERS, CLEANUP_FAILURES_TOTAL, DEAD_LETTERS_TOTAL, DROPPED_EVENTS_TOTAL, JOBS_TOTAL,
    JOB_DURATION,
};

/// Metrics collector for recording result loader operational metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished job.
    ///
    /// # Arguments
    ///
    /// * `outcome` - "success" or "failure"
    /// * `step` - The failed step, or "none" for successful jobs
    /// * `duration_secs` - Job processing duration in seconds
    pub fn record_job(&self, outcome: &str, step: &str, duration_secs: f64) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total.with_label_values(&[outcome, step]).inc();
        }

        if let Some(job_duration) = JOB_DURATION.get() {
            job_duration.observe(duration_secs);
        }

        tracing::trace!(
            outcome = outcome,
            step = step,
            duration_secs = duration_secs,
            "Recorded job metric"
        );
    }

    pub fn record_dead_letter(&self, step: &str) {
        if let Some(dead_letters) = DEAD_LETTERS_TOTAL.get() {
            dead_letters.with_label_values(&[step]).inc();
        }
    }

    /// Record an inbound event the subscriber dropped.
    pub fn record_dropped_event(&self, reason: &str) {
        if let Some(dropped) = DROPPED_EVENTS_TOTAL.get() {
            dropped.with_label_values(&[reason]).inc();
        }
    }

    /// Record a failed cleanup of `target` ("source" or "question_set").
    pub fn record_cleanup_failure(&self, target: &str) {
        if let Some(failures) = CLEANUP_FAILURES_TOTAL.get() {
            failures.with_label_values(&[target]).inc();
        }
    }

    pub fn inc_active_workers(&self) {
        if let Some(active_workers) = ACTIVE_WORKERS.get() {
            active_workers.inc();
        }
    }

    pub fn dec_active_workers(&self) {
        if let Some(active_workers) = ACTIVE_WORKERS.get() {
            active_workers.dec();
        }
    }
}
