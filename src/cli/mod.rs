//! Command line interface for macprov.
//!
//! Parses arguments, checks the host before anything runs, and reports every
//! step as it happens.

mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, RuntimeConfig, VerifyTarget};
pub use commands::execute_command;
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
