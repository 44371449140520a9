//! Error types for macprov operations.
//!
//! This module defines all error types with actionable error messages and recovery suggestions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for macprov operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Main error type for all macprov operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// A capability required by the command is missing
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// External command errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Disk provisioning errors
    #[error("Disk error: {0}")]
    Disk(#[from] DiskError),

    /// Download errors
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A critical step failed and the run was aborted
    #[error("Step '{step}' failed: {reason}")]
    StepFailed {
        /// Description of the step
        step: String,
        /// Reason for the error
        reason: String,
    },

    /// One or more verification checks did not pass
    #[error("{failed} of {total} verification checks failed")]
    VerificationFailed {
        /// Number of failed checks
        failed: usize,
        /// Number of checks run
        total: usize,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Property list errors
    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Template rendering errors
    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Capability checks performed once at process entry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// Not running on macOS
    #[error("This command only runs on macOS (detected '{os}')")]
    NotMacOs {
        /// Detected operating system
        os: String,
    },

    /// CPU architecture is neither Apple Silicon nor Intel
    #[error("Unsupported CPU architecture '{arch}'")]
    UnsupportedArchitecture {
        /// Detected architecture
        arch: String,
    },

    /// Administrative privileges required
    #[error("This command must be run with administrative privileges (try: sudo macprov {command})")]
    NotElevated {
        /// Command name
        command: String,
    },

    /// Command must run as the logged-in user
    #[error("This command must not be run as root (run 'macprov {command}' without sudo)")]
    Elevated {
        /// Command name
        command: String,
    },

    /// Destructive command invoked without confirmation
    #[error("Refusing to run '{command}' without --confirm")]
    NotConfirmed {
        /// Command name
        command: String,
    },
}

/// External command errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// Program not found on PATH
    #[error("'{program}' not found")]
    NotFound {
        /// Program name
        program: String,
    },

    /// Program could not be started
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Program exited unsuccessfully
    #[error("'{command}' exited with {}: {stderr}", exit_label(.code))]
    Failed {
        /// Rendered command line
        command: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Disk provisioning errors
#[derive(Error, Debug)]
pub enum DiskError {
    /// Identifier is not of the form diskN
    #[error("Invalid disk identifier '{identifier}' (expected e.g. disk4)")]
    InvalidIdentifier {
        /// Identifier given
        identifier: String,
    },

    /// Disk is internal or hosts the running system
    #[error("Refusing to erase {identifier}: {reason}")]
    Protected {
        /// Disk identifier
        identifier: String,
        /// Reason for the refusal
        reason: String,
    },

    /// No installer application available
    #[error("No macOS installer found (searched {searched:?})")]
    InstallerNotFound {
        /// Locations searched
        searched: Vec<PathBuf>,
    },

    /// Volume name is unusable as a mount point
    #[error("Invalid volume name '{name}'")]
    InvalidVolumeName {
        /// Name given
        name: String,
    },
}

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// URL could not be parsed
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// URL given
        url: String,
        /// Reason for the error
        reason: String,
    },

    /// Request failed after all attempts
    #[error("Failed to download {url} after {attempts} attempt(s): {reason}")]
    RequestFailed {
        /// URL requested
        url: String,
        /// Attempts made
        attempts: u32,
        /// Last error
        reason: String,
    },

    /// Digest did not match the pinned value
    #[error("SHA-256 mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        /// URL requested
        url: String,
        /// Pinned digest
        expected: String,
        /// Computed digest
        actual: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// Parsed values are inconsistent
    #[error("Invalid configuration: {reason}")]
    Invalid {
        /// Reason for the error
        reason: String,
    },
}

impl ProvisionError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ProvisionError::Precondition(PreconditionError::NotElevated { command }) => vec![
                format!("Re-run with administrative privileges: sudo macprov {command}"),
            ],
            ProvisionError::Precondition(PreconditionError::Elevated { command }) => vec![
                format!("Re-run as your login user: macprov {command}"),
                "Per-user preferences written as root land in root's home directory".to_string(),
            ],
            ProvisionError::Precondition(PreconditionError::NotConfirmed { command }) => vec![
                format!("This erases the startup disk. Pass --confirm to macprov {command} if you mean it"),
            ],
            ProvisionError::Disk(DiskError::InstallerNotFound { .. }) => vec![
                "Download an installer: softwareupdate --fetch-full-installer".to_string(),
                "Or point at one explicitly with --installer".to_string(),
            ],
            ProvisionError::Disk(DiskError::Protected { .. }) => vec![
                "List external disks: diskutil list external".to_string(),
            ],
            ProvisionError::Command(CommandError::NotFound { program }) => vec![
                format!("Make sure '{program}' is installed and on PATH"),
            ],
            ProvisionError::Download(DownloadError::HashMismatch { .. }) => vec![
                "Update the pinned sha256 in the config if the upstream artifact changed".to_string(),
            ],
            ProvisionError::Config(_) => vec![
                "Check the configuration file, or pass --config with a different path".to_string(),
            ],
            _ if self.is_recoverable() => {
                vec!["Fix the problem above and re-run; every step is safe to re-apply".to_string()]
            }
            _ => Vec::new(),
        }
    }

    /// Check if re-running the same command can succeed without user changes
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ProvisionError::Precondition(_)
                | ProvisionError::Disk(DiskError::InvalidIdentifier { .. })
                | ProvisionError::Disk(DiskError::Protected { .. })
                | ProvisionError::Config(_)
        )
    }

    /// Build a critical step failure from any displayable reason
    pub fn step_failed(step: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ProvisionError::StepFailed {
            step: step.into(),
            reason: reason.to_string(),
        }
    }
}
