//! Keeps a sudo timestamp fresh while long unprivileged steps run.
//!
//! Homebrew's installer and some casks call sudo themselves, possibly many
//! minutes after the user typed their password. The guard refreshes the
//! timestamp in the background and stops when dropped.

use crate::error::{CommandError, Result};
use crate::process::{CommandRunner, CommandSpec, IoMode};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Refresh interval; sudo's default timeout is five minutes
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// RAII guard for the background refresh task
#[derive(Debug)]
pub struct SudoKeepAlive {
    handle: Option<JoinHandle<()>>,
}

impl SudoKeepAlive {
    /// Prompt for the password once (`sudo -v`), then refresh periodically.
    ///
    /// In a dry run nothing is prompted and no task is started.
    pub async fn start<R: CommandRunner>(runner: &R) -> Result<Self> {
        runner
            .run(&CommandSpec::new("sudo").arg("-v").io(IoMode::Passthrough))
            .await?;

        if runner.is_dry_run() {
            return Ok(Self { handle: None });
        }

        let handle = tokio::spawn(async {
            let mut interval = tokio::time::interval(REFRESH_INTERVAL);
            // First tick fires immediately; the timestamp is already fresh
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = refresh().await {
                    log::debug!("sudo keep-alive refresh failed: {}", e);
                }
            }
        });

        log::debug!("sudo keep-alive started");
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Whether a refresh task is running
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

async fn refresh() -> std::result::Result<(), CommandError> {
    let status = tokio::process::Command::new("sudo")
        .args(["-n", "true"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map_err(|source| CommandError::Spawn {
            program: "sudo".to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(CommandError::Failed {
            command: "sudo -n true".to_string(),
            code: status.code(),
            stderr: String::new(),
        })
    }
}

impl Drop for SudoKeepAlive {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            log::debug!("sudo keep-alive stopped");
        }
    }
}
