//! Command-line interface for etlflow.
//!
//! Provides commands to run a pipeline, score a source for quality, and list
//! configured plugins.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
