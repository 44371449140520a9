//! Command execution.
//!
//! Every command follows the same path: validate arguments, check host
//! capabilities, load configuration, then run one workflow against a real or
//! dry-run runner while each recorded step is printed and logged.

mod bootstrap;
mod browser;
mod harden;
mod persist;
mod personalize;
mod reinstall;
mod rotate_key;
mod usb;
mod verify;

pub use verify::checks_for;

use crate::apply::{ApplyTracker, RunSummary, VerificationReport, VerifyCheck, run_checks};
use crate::cli::{Args, Command, OutputManager, RuntimeConfig};
use crate::config::ProvisionConfig;
use crate::error::{PreconditionError, ProvisionError, Result};
use crate::host::HostInfo;
use crate::process::{CommandRunner, DryRunRunner, SystemRunner};
use crate::provision::Context;
use crate::runlog::RunLog;
use std::path::Path;

/// State shared by one command's workflow
pub(super) struct Session<'a, R> {
    pub(super) ctx: Context<'a, R>,
    pub(super) runtime: &'a RuntimeConfig,
    pub(super) tracker: ApplyTracker,
    log: Option<RunLog>,
}

impl<'a, R: CommandRunner> Session<'a, R> {
    fn new(ctx: Context<'a, R>, runtime: &'a RuntimeConfig, log: Option<RunLog>) -> Self {
        let output = runtime.output().clone();
        let sink = log.clone();
        let tracker = ApplyTracker::with_observer(move |record| {
            output.record(record);
            if let Some(log) = &sink {
                log.record(record);
            }
        });

        Self {
            ctx,
            runtime,
            tracker,
            log,
        }
    }

    /// Run read-back checks and report each result.
    ///
    /// In a dry run the checks are listed instead, since nothing was written.
    pub(super) async fn verify(&self, checks: &[VerifyCheck]) -> Option<VerificationReport> {
        self.runtime.section("Verification");

        if self.ctx.dry_run() {
            for check in checks {
                self.runtime.indent(&format!("[dry-run] would check: {}", check.description));
            }
            return None;
        }

        let report = run_checks(self.ctx.runner, checks).await;
        for result in &report.results {
            self.runtime.output().check(result);
            if let Some(log) = &self.log {
                log.check(result);
            }
        }

        if report.success() {
            self.runtime.success_println(&report.summary());
        } else {
            self.runtime.warning_println(&report.summary());
        }
        if let Some(log) = &self.log {
            log.line(&format!("verify: {}", report.summary()));
        }
        Some(report)
    }

    fn finish(self) -> RunSummary {
        let summary = self.tracker.finish();
        if summary.records().is_empty() {
            return summary;
        }

        self.runtime.section("Summary");
        self.runtime.println(&summary.summary());
        for record in summary.warnings().into_iter().chain(summary.failures()) {
            self.runtime.indent(&record.format_result());
        }
        if let Some(log) = &self.log {
            log.summary(&summary);
            self.runtime.println(&format!("Run log: {}", log.path().display()));
        }
        summary
    }
}

/// Execute the main command based on parsed arguments
pub async fn execute_command(args: Args) -> Result<i32> {
    // Validate arguments
    if let Err(validation_error) = args.validate() {
        // Create output for validation errors (never quiet)
        let output = OutputManager::new(false, false);
        output.error(&format!("Invalid arguments: {}", validation_error));
        return Ok(1);
    }

    let runtime = RuntimeConfig::from(&args);
    let host = HostInfo::detect();

    // Nothing may run, not even in a dry run, until the host qualifies
    if let Err(e) = preflight(&args, &host) {
        report_failure(&runtime, &args, &ProvisionError::Precondition(e));
        return Ok(1);
    }

    let result = match load_config(&args) {
        Ok(config) if args.dry_run => {
            dispatch(&args, &runtime, &host, &config, &DryRunRunner::new()).await
        }
        Ok(config) => dispatch(&args, &runtime, &host, &config, &SystemRunner::new()).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(exit_code) => Ok(exit_code),
        Err(e) => {
            report_failure(&runtime, &args, &e);
            Ok(1)
        }
    }
}

/// Capability and confirmation checks, before any command runs
fn preflight(args: &Args, host: &HostInfo) -> std::result::Result<(), PreconditionError> {
    let name = args.command.name();
    host.require(name, args.command.capabilities())?;

    if let Command::Reinstall { confirm: false, .. } = &args.command {
        return Err(PreconditionError::NotConfirmed {
            command: name.to_string(),
        });
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ProvisionConfig> {
    let mut config = ProvisionConfig::load(args.config.as_deref())?;
    if let Some(dir) = &args.log_dir {
        config.general.log_dir = Some(dir.clone());
    }
    Ok(config)
}

fn report_failure(runtime: &RuntimeConfig, args: &Args, e: &ProvisionError) {
    runtime.error_println(&format!("Command '{}' failed: {}", args.command.name(), e));

    let suggestions = e.recovery_suggestions();
    if !suggestions.is_empty() && !runtime.is_quiet() {
        runtime.println("\n💡 Recovery suggestions:");
        for suggestion in suggestions {
            runtime.println(&format!("  • {}", suggestion));
        }
    }
}

/// Run log for this invocation; none in a dry run or when it can't be created.
///
/// Under sudo the file is handed to the invoking user.
fn open_log(
    runtime: &RuntimeConfig,
    host: &HostInfo,
    config: &ProvisionConfig,
    home: &Path,
    command: &str,
) -> Option<RunLog> {
    if runtime.is_dry_run() {
        return None;
    }
    let dir = config.log_dir(home);
    let log = match RunLog::create(&dir, command) {
        Ok(log) => log,
        Err(e) => {
            runtime.warning_println(&format!("Run log disabled ({}): {}", dir.display(), e));
            return None;
        }
    };
    runtime.verbose_println(&format!("Logging to {}", log.path().display()));

    if let Some(user) = host.preference_owner()
        && let Err(e) = log.hand_to(&user)
    {
        runtime.warning_println(&format!(
            "Run log {} stays owned by root: {}",
            log.path().display(),
            e
        ));
    }
    Some(log)
}

async fn dispatch<R: CommandRunner>(
    args: &Args,
    runtime: &RuntimeConfig,
    host: &HostInfo,
    config: &ProvisionConfig,
    runner: &R,
) -> Result<i32> {
    let home = host
        .home_dir()
        .ok_or_else(|| anyhow::anyhow!("could not determine the home directory"))?;

    let log = open_log(runtime, host, config, &home, args.command.name());
    let mut session = Session::new(Context::new(runner, host, config, home), runtime, log);

    if runner.is_dry_run() {
        runtime.warning_println("Dry run: commands are printed, not executed");
    }

    let result = match &args.command {
        Command::Usb { .. } => usb::execute_usb(args, &mut session).await,
        Command::Reinstall { .. } => reinstall::execute_reinstall(args, &mut session).await,
        Command::Bootstrap => bootstrap::execute_bootstrap(&mut session).await,
        Command::Harden => harden::execute_harden(&mut session).await,
        Command::Personalize { .. } => personalize::execute_personalize(args, &mut session).await,
        Command::Persist { .. } => persist::execute_persist(args, &mut session).await,
        Command::RotateKey { .. } => rotate_key::execute_rotate_key(args, &mut session).await,
        Command::Browser => browser::execute_browser(&mut session).await,
        Command::Verify { .. } => verify::execute_verify(args, &session).await,
    };

    let summary = session.finish();
    result?;

    if summary.records().is_empty() {
        runtime.success_println(&format!("Command '{}' completed", args.command.name()));
    } else {
        runtime.success_println(&format!(
            "Command '{}' completed ({})",
            args.command.name(),
            summary.summary()
        ));
    }
    Ok(0)
}
