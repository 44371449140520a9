//! Erase the startup disk and reinstall macOS.

use super::Context;
use super::disk::find_installer;
use crate::apply::ApplyTracker;
use crate::error::{DiskError, Result};
use crate::host::{Architecture, Capability};
use crate::process::{CommandRunner, CommandSpec, IoMode};
use std::path::{Path, PathBuf};

/// Capabilities `reinstall` needs
pub const CAPABILITIES: &[Capability] = &[
    Capability::MacOs,
    Capability::SupportedArchitecture,
    Capability::Elevated,
];

/// Installer search order: bootable media first, then /Applications
pub const INSTALLER_PATTERNS: &[&str] = &[
    "/Volumes/*/Install macOS*.app",
    "/Applications/Install macOS*.app",
];

/// `<app>/Contents/Resources/startosinstall`
pub fn startosinstall(installer: &Path) -> PathBuf {
    installer
        .join("Contents")
        .join("Resources")
        .join("startosinstall")
}

/// Build the `startosinstall` invocation.
///
/// Apple Silicon needs a volume owner to authorize the erase, so the invoking
/// user is passed along and the password is prompted for on the terminal.
pub fn startosinstall_command(
    installer: &Path,
    new_volume_name: &str,
    arch: Architecture,
    user: Option<&str>,
) -> CommandSpec {
    let mut spec = CommandSpec::new(startosinstall(installer).to_string_lossy())
        .args(["--eraseinstall", "--agreetolicense", "--nointeraction"])
        .arg("--newvolumename")
        .arg(new_volume_name)
        .io(IoMode::Passthrough);

    if arch == Architecture::AppleSilicon
        && let Some(user) = user
    {
        spec = spec.arg("--user").arg(user).arg("--passprompt");
    }
    spec
}

/// Locate an installer that carries `startosinstall`
pub fn find_reinstaller(explicit: Option<&Path>) -> std::result::Result<PathBuf, DiskError> {
    let installer = find_installer(explicit, INSTALLER_PATTERNS)?;
    if startosinstall(&installer).exists() {
        Ok(installer)
    } else {
        Err(DiskError::InstallerNotFound {
            searched: vec![startosinstall(&installer)],
        })
    }
}

/// Hand the machine over to `startosinstall`.
///
/// On success the installer reboots the machine, so returning at all usually
/// means it was interrupted.
pub async fn erase_and_install<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    installer: &Path,
) -> Result<()> {
    let user = ctx.host.target_user();
    if ctx.host.architecture() == Architecture::AppleSilicon && user.is_none() {
        log::warn!("No invoking user known; startosinstall will ask for a volume owner");
    }

    let command = startosinstall_command(
        installer,
        &ctx.config.reinstall.new_volume_name,
        ctx.host.architecture(),
        user.as_deref(),
    );
    tracker
        .require(
            format!("Erase and install from {}", installer.display()),
            ctx.runner.run(&command),
        )
        .await?;
    Ok(())
}
