//! Login agent command.

use super::Session;
use crate::cli::{Args, Command};
use crate::error::Result;
use crate::process::CommandRunner;
use crate::provision::launch_agent;

/// Execute persist command
pub(super) async fn execute_persist<R: CommandRunner>(
    args: &Args,
    session: &mut Session<'_, R>,
) -> Result<()> {
    if matches!(args.command, Command::Persist { remove: true }) {
        session.runtime.section("Removing login agent");
        launch_agent::remove(&session.ctx, &mut session.tracker).await
    } else {
        session.runtime.section("Installing login agent");
        launch_agent::install(&session.ctx, &mut session.tracker).await
    }
}
