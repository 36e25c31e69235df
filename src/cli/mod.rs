//! Command-line interface for the teddy pipeline.
//!
//! Provides commands for running the DAG, managing the schema and
//! inspecting the task graph.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
