//! Read-only verification command.

use super::Session;
use crate::apply::VerifyCheck;
use crate::cli::{Args, Command, VerifyTarget};
use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::host::HostInfo;
use crate::process::CommandRunner;
use crate::provision::{harden, personalize};
use std::path::Path;

/// Checks for a target, in report order
pub fn checks_for(
    target: VerifyTarget,
    host: &HostInfo,
    home: &Path,
    config: &ProvisionConfig,
) -> Vec<VerifyCheck> {
    let mut checks = Vec::new();
    if matches!(target, VerifyTarget::Harden | VerifyTarget::All) {
        checks.extend(harden::verify_checks(host, &config.harden));
    }
    if matches!(target, VerifyTarget::Personalize | VerifyTarget::All) {
        checks.extend(personalize::verify_checks(host, home, &config.personalize));
    }
    checks
}

/// Execute verify command; any failed check fails the command
pub(super) async fn execute_verify<R: CommandRunner>(
    args: &Args,
    session: &Session<'_, R>,
) -> Result<()> {
    let Command::Verify { target } = &args.command else {
        return Ok(());
    };

    let ctx = &session.ctx;
    let checks = checks_for(*target, ctx.host, &ctx.home, ctx.config);
    match session.verify(&checks).await {
        Some(report) => report.ensure_success(),
        None => Ok(()),
    }
}
