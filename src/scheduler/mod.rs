//! Job scheduling: the worker pool, the per-job pipeline and failure routing.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  Subscriber  │
//!                      └──────┬───────┘
//!                             │ quiz ids (bounded)
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 0│         │ Worker 1│         │ Worker N│
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         └───────────────────┼───────────────────┘
//!                             │ CompleteJob
//!                      ┌──────▼───────┐
//!                      │    Router    │── success log
//!                      └──────┬───────┘
//!                             │ DeadLetter
//!                      ┌──────▼───────┐
//!                      │     Sink     │
//!                      └──────────────┘
//! ```
//!
//! Each job runs its steps strictly in order. Steps 1 to 4 (load questions,
//! extract, combine, load) are terminal on failure; step 5 (cleanup) only
//! ever logs.

pub mod dead_letter;
pub mod job;
pub mod pipeline;
pub mod worker_pool;

#[cfg(test)]
pub(crate) mod testing;

pub use dead_letter::{route_completions, run_dead_letter_sink, DeadLetterSink, LogDeadLetterSink};
pub use job::{CompleteJob, DeadLetter, JobError, JobStep};
pub use pipeline::JobPipeline;
pub use worker_pool::{PoolError, PoolStats, WorkerPool, WorkerPoolConfig};
