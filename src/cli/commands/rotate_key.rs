//! Recovery key rotation command.

use super::Session;
use crate::cli::{Args, Command};
use crate::error::Result;
use crate::process::CommandRunner;
use crate::provision::recovery_key;

/// Execute rotate-key command
pub(super) async fn execute_rotate_key<R: CommandRunner>(
    args: &Args,
    session: &mut Session<'_, R>,
) -> Result<()> {
    let Command::RotateKey { output } = &args.command else {
        return Ok(());
    };

    let output = output.clone().unwrap_or_else(|| {
        recovery_key::default_key_path(&session.ctx.config.log_dir(&session.ctx.home))
    });

    session.runtime.section("FileVault recovery key");
    session
        .runtime
        .println("fdesetup will ask for an account password that can unlock the disk");

    if let Some(path) = recovery_key::rotate(&session.ctx, &mut session.tracker, &output).await? {
        session
            .runtime
            .success_println(&format!("New recovery key saved to {}", path.display()));
        session
            .runtime
            .indent("Move it somewhere safe, then delete the file");
    }
    Ok(())
}
