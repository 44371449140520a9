//! Bootable installer media command.

use super::Session;
use crate::cli::{Args, Command};
use crate::error::Result;
use crate::process::CommandRunner;
use crate::provision::disk;

/// Execute usb command
pub(super) async fn execute_usb<R: CommandRunner>(
    args: &Args,
    session: &mut Session<'_, R>,
) -> Result<()> {
    let Command::Usb {
        disk: identifier,
        volume_name,
        installer,
    } = &args.command
    else {
        return Ok(());
    };

    let config = &session.ctx.config.usb;
    let volume_name = volume_name
        .as_deref()
        .unwrap_or(&config.default_volume_name);
    let explicit = installer.as_deref().or(config.installer_app.as_deref());
    let installer = disk::find_installer(explicit, disk::INSTALLER_PATTERNS)?;

    session.runtime.section("Bootable installer");
    session
        .runtime
        .println(&format!("Installer: {}", installer.display()));
    session.runtime.warning_println(&format!(
        "Everything on {} will be erased",
        identifier
    ));

    disk::create_installer_media(
        &session.ctx,
        &mut session.tracker,
        identifier,
        volume_name,
        &installer,
    )
    .await
}
