//! Host facts and capability checks.
//!
//! Every command declares the capabilities it needs and checks them once,
//! before any mutation. Nothing re-executes itself under sudo: a command that
//! needs root says so and exits.

use crate::error::PreconditionError;
use std::path::PathBuf;

/// CPU architecture families macOS ships on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// arm64 (M-series)
    AppleSilicon,
    /// x86_64
    Intel,
    /// Anything else
    Other,
}

impl Architecture {
    /// Map a `std::env::consts::ARCH` / `uname -m` string to a family
    pub fn from_arch_str(arch: &str) -> Self {
        match arch {
            "aarch64" | "arm64" => Architecture::AppleSilicon,
            "x86_64" => Architecture::Intel,
            _ => Architecture::Other,
        }
    }

    /// Homebrew installation prefix for this architecture
    pub fn homebrew_prefix(&self) -> &'static str {
        match self {
            Architecture::AppleSilicon => "/opt/homebrew",
            _ => "/usr/local",
        }
    }
}

/// Something a command needs from the host before it may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Host OS is macOS
    MacOs,
    /// Apple Silicon or Intel
    SupportedArchitecture,
    /// Effective uid 0
    Elevated,
    /// Effective uid is not 0
    Unprivileged,
}

/// Facts about the running host, captured once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Operating system name as reported by `std::env::consts::OS`
    pub os: String,
    /// Raw architecture string
    pub arch: String,
    /// Effective user id
    pub effective_uid: u32,
    /// User who invoked sudo, if any
    pub invoking_user: Option<String>,
}

impl HostInfo {
    /// Detect facts about the current process
    pub fn detect() -> Self {
        let invoking_user = std::env::var("SUDO_USER")
            .ok()
            .filter(|user| !user.is_empty() && user != "root");

        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            effective_uid: effective_uid(),
            invoking_user,
        }
    }

    /// Architecture family
    pub fn architecture(&self) -> Architecture {
        Architecture::from_arch_str(&self.arch)
    }

    /// Whether the process runs as root
    pub fn is_elevated(&self) -> bool {
        self.effective_uid == 0
    }

    /// Check every capability in order and report the first one missing
    pub fn require(
        &self,
        command: &str,
        capabilities: &[Capability],
    ) -> Result<(), PreconditionError> {
        for capability in capabilities {
            match capability {
                Capability::MacOs if self.os != "macos" => {
                    return Err(PreconditionError::NotMacOs {
                        os: self.os.clone(),
                    });
                }
                Capability::SupportedArchitecture
                    if self.architecture() == Architecture::Other =>
                {
                    return Err(PreconditionError::UnsupportedArchitecture {
                        arch: self.arch.clone(),
                    });
                }
                Capability::Elevated if !self.is_elevated() => {
                    return Err(PreconditionError::NotElevated {
                        command: command.to_string(),
                    });
                }
                Capability::Unprivileged if self.is_elevated() => {
                    return Err(PreconditionError::Elevated {
                        command: command.to_string(),
                    });
                }
                _ => {}
            }
        }

        log::debug!("Preconditions for '{}' satisfied: {:?}", command, capabilities);
        Ok(())
    }

    /// Login name of the user per-user settings should be written for.
    ///
    /// Under sudo this is `SUDO_USER`; otherwise the current user.
    pub fn target_user(&self) -> Option<String> {
        self.invoking_user.clone().or_else(current_user_name)
    }

    /// User whose preference domains must be reached through `sudo -u`.
    ///
    /// Only a root process needs to switch users; otherwise `None`.
    pub fn preference_owner(&self) -> Option<String> {
        self.invoking_user.clone().filter(|_| self.is_elevated())
    }
}

impl HostInfo {
    /// Home directory of the user being provisioned.
    ///
    /// Under sudo `HOME` may point at root's home, so the invoking user's
    /// entry in the user database is preferred.
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.invoking_user
            .as_deref()
            .filter(|_| self.is_elevated())
            .and_then(home_of)
            .or_else(dirs::home_dir)
    }
}

#[cfg(unix)]
fn home_of(user: &str) -> Option<PathBuf> {
    use users::os::unix::UserExt;
    users::get_user_by_name(user).map(|u| u.home_dir().to_path_buf())
}

#[cfg(not(unix))]
fn home_of(_user: &str) -> Option<PathBuf> {
    None
}

#[cfg(unix)]
fn effective_uid() -> u32 {
    users::get_effective_uid()
}

#[cfg(not(unix))]
fn effective_uid() -> u32 {
    u32::MAX
}

#[cfg(unix)]
fn current_user_name() -> Option<String> {
    users::get_current_username().map(|name| name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn current_user_name() -> Option<String> {
    std::env::var("USERNAME").ok()
}

/// Numeric uid of the GUI session `launchctl` should target
#[cfg(unix)]
pub fn gui_domain() -> String {
    format!("gui/{}", users::get_current_uid())
}

/// Numeric uid of the GUI session `launchctl` should target
#[cfg(not(unix))]
pub fn gui_domain() -> String {
    "gui/0".to_string()
}
