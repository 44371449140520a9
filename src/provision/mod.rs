//! Provisioning workflows.
//!
//! Each submodule implements one workflow as a sequence of steps recorded on
//! an [`ApplyTracker`](crate::apply::ApplyTracker). Workflows never check
//! preconditions themselves; the CLI does that before calling them.

pub mod bootstrap;
pub mod browser;
pub mod disk;
pub mod harden;
pub mod launch_agent;
pub mod personalize;
pub mod recovery_key;
pub mod reinstall;

use crate::config::ProvisionConfig;
use crate::host::HostInfo;
use crate::process::CommandRunner;
use std::path::{Path, PathBuf};

/// Everything a workflow needs, borrowed for the duration of a command
#[derive(Debug)]
pub struct Context<'a, R> {
    /// Command runner (real or dry-run)
    pub runner: &'a R,
    /// Host facts captured at startup
    pub host: &'a HostInfo,
    /// Loaded configuration
    pub config: &'a ProvisionConfig,
    /// Home directory of the user being provisioned
    pub home: PathBuf,
}

impl<'a, R: CommandRunner> Context<'a, R> {
    /// Bundle the shared state for a workflow
    pub fn new(runner: &'a R, host: &'a HostInfo, config: &'a ProvisionConfig, home: PathBuf) -> Self {
        Self {
            runner,
            host,
            config,
            home,
        }
    }

    /// Whether mutations are only being printed
    pub fn dry_run(&self) -> bool {
        self.runner.is_dry_run()
    }

    /// Write a text file, creating parent directories; skipped in a dry run
    pub async fn write_text(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        if self.dry_run() {
            log::info!("[dry-run] write {} ({} bytes)", path.display(), contents.len());
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await
    }
}
