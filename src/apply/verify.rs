//! Read-back verification of applied settings.

use crate::preferences::{PreferenceKey, PreferenceValue};
use crate::error::{ProvisionError, Result};
use crate::process::{CommandRunner, CommandSpec};

/// How a check observes the system
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// `defaults read` must return the literal
    Preference {
        /// Key to read
        key: PreferenceKey,
        /// Literal that was written
        expected: PreferenceValue,
    },
    /// A status command's stdout must contain a substring
    CommandOutput {
        /// Status command
        command: CommandSpec,
        /// Substring expected in stdout
        expect_contains: String,
    },
}

/// One verification check
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyCheck {
    /// What is being checked
    pub description: String,
    /// How to observe it
    pub probe: Probe,
}

impl VerifyCheck {
    /// Check that a status command mentions `expect_contains`
    pub fn command_output(
        description: impl Into<String>,
        command: CommandSpec,
        expect_contains: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            probe: Probe::CommandOutput {
                command,
                expect_contains: expect_contains.into(),
            },
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// What was checked
    pub description: String,
    /// Whether the observation matched
    pub passed: bool,
    /// What was actually observed
    pub observed: String,
}

impl CheckResult {
    /// One pass/fail line
    pub fn format_result(&self) -> String {
        if self.passed {
            format!("PASS {}", self.description)
        } else {
            format!("FAIL {} (observed: {})", self.description, self.observed)
        }
    }
}

/// Results of a verification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Per-check results, in check order
    pub results: Vec<CheckResult>,
}

impl VerificationReport {
    /// True when every check passed
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Checks that did not pass
    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }

    /// `Ok` when every check passed, otherwise
    /// [`ProvisionError::VerificationFailed`]
    pub fn ensure_success(&self) -> Result<()> {
        let failed = self.failed_checks().len();
        if failed == 0 {
            Ok(())
        } else {
            Err(ProvisionError::VerificationFailed {
                failed,
                total: self.results.len(),
            })
        }
    }

    /// Totals line
    pub fn summary(&self) -> String {
        let total = self.results.len();
        let passed = total - self.failed_checks().len();
        if self.success() {
            format!("All {total} checks passed")
        } else {
            format!("{passed}/{total} checks passed")
        }
    }
}

/// Run a single check
pub async fn run_check<R: CommandRunner>(runner: &R, check: &VerifyCheck) -> CheckResult {
    let (passed, observed) = match &check.probe {
        Probe::Preference { key, expected } => match runner.run(&key.read_command()).await {
            Ok(output) => {
                let observed = output.stdout.trim_end().to_string();
                (expected.matches_read(&output.stdout), observed)
            }
            Err(e) => (false, format!("unreadable: {e}")),
        },
        Probe::CommandOutput {
            command,
            expect_contains,
        } => match runner.output(command).await {
            Ok(output) => {
                let combined = format!("{}{}", output.stdout, output.stderr);
                (
                    combined.contains(expect_contains.as_str()),
                    combined.trim().to_string(),
                )
            }
            Err(e) => (false, format!("unavailable: {e}")),
        },
    };

    log::debug!("Check '{}': passed={} observed={:?}", check.description, passed, observed);

    CheckResult {
        description: check.description.clone(),
        passed,
        observed,
    }
}

/// Run every check in order
pub async fn run_checks<R: CommandRunner>(runner: &R, checks: &[VerifyCheck]) -> VerificationReport {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        results.push(run_check(runner, check).await);
    }
    VerificationReport { results }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_summary() {
        let report = VerificationReport {
            results: vec![
                CheckResult {
                    description: "Dock autohide".to_string(),
                    passed: true,
                    observed: "1".to_string(),
                },
                CheckResult {
                    description: "Key repeat".to_string(),
                    passed: false,
                    observed: "6".to_string(),
                },
            ],
        };
        assert!(!report.success());
        assert_eq!(report.summary(), "1/2 checks passed");
        assert!(matches!(
            report.ensure_success(),
            Err(ProvisionError::VerificationFailed {
                failed: 1,
                total: 2
            })
        ));
        assert_eq!(
            report.failed_checks()[0].format_result(),
            "FAIL Key repeat (observed: 6)"
        );
    }

    #[test]
    fn test_empty_report_passes() {
        let report = VerificationReport::default();
        assert!(report.success());
        assert!(report.ensure_success().is_ok());
        assert_eq!(report.summary(), "All 0 checks passed");
    }
}
