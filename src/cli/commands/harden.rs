//! Security defaults command.

use super::Session;
use crate::error::Result;
use crate::process::CommandRunner;
use crate::provision::harden;

/// Execute harden command.
///
/// Verification failures are reported but don't fail the command; a
/// deferred FileVault enablement legitimately reads back as off.
pub(super) async fn execute_harden<R: CommandRunner>(session: &mut Session<'_, R>) -> Result<()> {
    session.runtime.section("Hardening");
    harden::apply(&session.ctx, &mut session.tracker).await?;

    let checks = harden::verify_checks(session.ctx.host, &session.ctx.config.harden);
    session.verify(&checks).await;
    Ok(())
}
