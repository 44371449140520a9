//! Developer tooling command.

use super::Session;
use crate::error::Result;
use crate::process::CommandRunner;
use crate::provision::bootstrap;

/// Execute bootstrap command
pub(super) async fn execute_bootstrap<R: CommandRunner>(session: &mut Session<'_, R>) -> Result<()> {
    session.runtime.section("Bootstrap");
    session
        .runtime
        .println("Your password may be requested once for Homebrew");

    bootstrap::run(&session.ctx, &mut session.tracker).await
}
