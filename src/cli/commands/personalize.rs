//! UI preferences command.

use super::Session;
use crate::cli::{Args, Command};
use crate::error::Result;
use crate::process::CommandRunner;
use crate::provision::personalize;

/// Execute personalize command
pub(super) async fn execute_personalize<R: CommandRunner>(
    args: &Args,
    session: &mut Session<'_, R>,
) -> Result<()> {
    let restart = !matches!(args.command, Command::Personalize { no_restart: true });

    session.runtime.section("Personalization");
    personalize::apply(&session.ctx, &mut session.tracker, restart).await?;

    let checks = personalize::verify_checks(
        session.ctx.host,
        &session.ctx.home,
        &session.ctx.config.personalize,
    );
    session.verify(&checks).await;
    Ok(())
}
