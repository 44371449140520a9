//! Runners backed by real processes.

use super::{CommandOutput, CommandRunner, CommandSpec, IoMode};
use crate::error::CommandError;
use std::path::Path;
use std::process::Stdio;

/// Runs commands with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new system runner
    pub fn new() -> Self {
        Self
    }

    fn resolve(program: &str) -> Result<(), CommandError> {
        let found = if program.contains('/') {
            Path::new(program).exists()
        } else {
            which::which(program).is_ok()
        };

        if found {
            Ok(())
        } else {
            Err(CommandError::NotFound {
                program: program.to_string(),
            })
        }
    }
}

impl CommandRunner for SystemRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        // Check the real program, not the sudo wrapper
        Self::resolve(&spec.program)?;

        let (program, args) = spec.argv();
        log::debug!("Running: {}", spec.display());

        let mut command = tokio::process::Command::new(&program);
        command.args(&args);
        if spec.as_user.is_none() {
            command.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        match spec.io {
            IoMode::Captured => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
            IoMode::Interactive => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit());
            }
            IoMode::Passthrough => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
        }

        let output = command
            .output()
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => CommandError::NotFound {
                    program: program.clone(),
                },
                _ => CommandError::Spawn {
                    program: program.clone(),
                    source,
                },
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            log::debug!(
                "'{}' exited with {:?}: {}",
                spec.display(),
                result.code,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}

/// Prints commands instead of running them.
///
/// Every command reports success with empty output, so read-backs and
/// status probes cannot be trusted in a dry run.
#[derive(Debug, Clone, Default)]
pub struct DryRunRunner;

impl DryRunRunner {
    /// Create a new dry-run runner
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for DryRunRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        log::info!("[dry-run] {}", spec.display());
        Ok(CommandOutput::ok(""))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
