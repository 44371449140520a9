//! External command execution.
//!
//! Every mutation macprov performs is an invocation of an OS utility. Commands
//! are described by [`CommandSpec`] and executed through a [`CommandRunner`],
//! so the provisioning code never touches `tokio::process` directly.

mod system;

pub use system::{DryRunRunner, SystemRunner};

use crate::error::CommandError;

/// How the child's standard streams are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoMode {
    /// Capture stdout and stderr, no stdin
    #[default]
    Captured,
    /// Inherit stdin and stderr for prompts, capture stdout
    Interactive,
    /// Inherit everything so long-running tools can show progress
    Passthrough,
}

/// Description of one external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or absolute path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Run as this user via `sudo -u`
    pub as_user: Option<String>,
    /// Stream wiring
    pub io: IoMode,
}

impl CommandSpec {
    /// Create a command with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            as_user: None,
            io: IoMode::Captured,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run as another user (only meaningful when elevated)
    pub fn as_user(mut self, user: Option<String>) -> Self {
        self.as_user = user;
        self
    }

    /// Choose stream wiring
    pub fn io(mut self, io: IoMode) -> Self {
        self.io = io;
        self
    }

    /// Program and arguments actually executed, after `sudo -u` wrapping.
    ///
    /// Environment variables are passed through `env` when wrapping, since
    /// sudo scrubs the caller's environment.
    pub fn argv(&self) -> (String, Vec<String>) {
        match &self.as_user {
            Some(user) => {
                let mut argv = vec!["-u".to_string(), user.clone()];
                if !self.env.is_empty() {
                    argv.push("env".to_string());
                    argv.extend(self.env.iter().map(|(k, v)| format!("{k}={v}")));
                }
                argv.push(self.program.clone());
                argv.extend(self.args.iter().cloned());
                ("sudo".to_string(), argv)
            }
            None => (self.program.clone(), self.args.clone()),
        }
    }

    /// Human-readable command line for logs and error messages
    pub fn display(&self) -> String {
        let (program, args) = self.argv();
        std::iter::once(program)
            .chain(args)
            .map(|part| shell_quote(&part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

fn shell_quote(part: &str) -> String {
    if !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured stdout (empty when inherited)
    pub stdout: String,
    /// Captured stderr (empty when inherited)
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes [`CommandSpec`]s
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run the command and return its output regardless of exit status.
    ///
    /// Errors only when the program is missing or cannot be started.
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Run the command and treat a non-zero exit as an error
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let output = self.output(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(CommandError::Failed {
                command: spec.display(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Whether commands are only being printed
    fn is_dry_run(&self) -> bool {
        false
    }
}
