//! # incidex CLI
//!
//! Operator binary for the incident retrieval engine: build the index, ask
//! questions against it, and inspect status and configuration.
//!
//! Run `incidex --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
