//! Command-line interface for gen-forge.
//!
//! Provides the `run` command that drives one generation job and a `config`
//! command that prints the effective configuration.

mod commands;

pub use commands::{exit_code_for, parse_cli, run, run_with_cli, Cli};
