//! Best-effort application of settings and their verification.

mod tracker;
mod verify;

pub use tracker::{ApplyTracker, Outcome, RunSummary, SettingRecord};
pub use verify::{CheckResult, Probe, VerificationReport, VerifyCheck, run_check, run_checks};

use crate::preferences::PreferenceWrite;
use crate::process::CommandRunner;

/// Apply preference writes in order, recording each outcome.
///
/// Returns how many writes succeeded.
pub async fn apply_preferences<R: CommandRunner>(
    runner: &R,
    tracker: &mut ApplyTracker,
    writes: &[PreferenceWrite],
) -> usize {
    let mut applied = 0;
    for write in writes {
        if tracker
            .attempt(write.description.clone(), runner.run(&write.command()))
            .await
            .is_some()
        {
            applied += 1;
        }
    }
    applied
}
