//! Metrics module for Prometheus-based monitoring.
//!
//! Counts jobs by outcome, dead letters, dropped inbound events and cleanup
//! failures, and tracks how many workers are busy.
//!
//! # Example
//!
//! ```ignore
//! use quiz_result_loader::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_job("success", "none", 0.25);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_WORKERS, CLEANUP_FAILURES_TOTAL, DEAD_LETTERS_TOTAL, DROPPED_EVENTS_TOTAL, JOBS_TOTAL,
    JOB_DURATION, REGISTRY,
};
