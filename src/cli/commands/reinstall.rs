//! Erase and reinstall command.

use super::Session;
use crate::cli::{Args, Command};
use crate::error::Result;
use crate::process::CommandRunner;
use crate::provision::reinstall;

/// Execute reinstall command
pub(super) async fn execute_reinstall<R: CommandRunner>(
    args: &Args,
    session: &mut Session<'_, R>,
) -> Result<()> {
    let Command::Reinstall { installer, .. } = &args.command else {
        return Ok(());
    };

    let explicit = installer
        .as_deref()
        .or(session.ctx.config.usb.installer_app.as_deref());
    let installer = reinstall::find_reinstaller(explicit)?;

    session.runtime.section("Erase and reinstall");
    session
        .runtime
        .println(&format!("Installer: {}", installer.display()));
    session
        .runtime
        .warning_println("This Mac's startup disk will be erased; the machine restarts when ready");

    reinstall::erase_and_install(&session.ctx, &mut session.tracker, &installer).await
}
