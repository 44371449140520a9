//! Browser bootstrap command.

use super::Session;
use crate::error::Result;
use crate::process::CommandRunner;
use crate::provision::browser;

/// Execute browser command
pub(super) async fn execute_browser<R: CommandRunner>(session: &mut Session<'_, R>) -> Result<()> {
    let name = session.ctx.config.browser.name.clone();
    session.runtime.section(&name);
    browser::run(&session.ctx, &mut session.tracker).await
}
