//! Command-line interface for quiz-result-loader.
//!
//! Provides commands for running the loader service, processing a single
//! quiz by hand and publishing quiz-complete events.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
