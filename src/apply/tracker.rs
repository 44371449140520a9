//! Outcome tracking for a single run.

use crate::error::{ProvisionError, Result};
use std::fmt::Display;
use std::future::Future;

/// What happened when a setting was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The mutation returned success
    Applied,
    /// A best-effort step failed; the run continued
    Warning(String),
    /// A critical step failed; the run stopped
    Failed(String),
}

/// One entry in the run's ordered record list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingRecord {
    /// Human-readable description of the setting
    pub description: String,
    /// Outcome of the attempt
    pub outcome: Outcome,
}

impl SettingRecord {
    /// One-line rendering used by the terminal and the run log
    pub fn format_result(&self) -> String {
        match &self.outcome {
            Outcome::Applied => format!("✓ {}", self.description),
            Outcome::Warning(reason) => format!("⚠ {} ({})", self.description, reason),
            Outcome::Failed(reason) => format!("✗ {} ({})", self.description, reason),
        }
    }
}

type Observer = Box<dyn Fn(&SettingRecord)>;

/// Request-scoped accumulator of setting outcomes.
///
/// Created at the start of a command, passed by `&mut` through every step and
/// consumed by [`ApplyTracker::finish`].
#[derive(Default)]
pub struct ApplyTracker {
    records: Vec<SettingRecord>,
    observer: Option<Observer>,
}

impl std::fmt::Debug for ApplyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyTracker")
            .field("records", &self.records)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl ApplyTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker that reports each record as it is added
    pub fn with_observer(observer: impl Fn(&SettingRecord) + 'static) -> Self {
        Self {
            records: Vec::new(),
            observer: Some(Box::new(observer)),
        }
    }

    fn push(&mut self, description: String, outcome: Outcome) {
        let record = SettingRecord {
            description,
            outcome,
        };
        if let Some(observer) = &self.observer {
            observer(&record);
        }
        self.records.push(record);
    }

    /// Record a success
    pub fn record_applied(&mut self, description: impl Into<String>) {
        self.push(description.into(), Outcome::Applied);
    }

    /// Record a best-effort failure
    pub fn record_warning(&mut self, description: impl Into<String>, reason: impl Display) {
        let description = description.into();
        log::warn!("{}: {}", description, reason);
        self.push(description, Outcome::Warning(reason.to_string()));
    }

    /// Record a critical failure
    pub fn record_failed(&mut self, description: impl Into<String>, reason: impl Display) {
        let description = description.into();
        log::error!("{}: {}", description, reason);
        self.push(description, Outcome::Failed(reason.to_string()));
    }

    /// Run a best-effort operation.
    ///
    /// Success is recorded as applied and its value returned; failure is
    /// recorded as a warning and `None` returned. Never aborts the run.
    pub async fn attempt<T, E, F>(&mut self, description: impl Into<String>, operation: F) -> Option<T>
    where
        E: Display,
        F: Future<Output = std::result::Result<T, E>>,
    {
        let description = description.into();
        match operation.await {
            Ok(value) => {
                self.record_applied(description);
                Some(value)
            }
            Err(e) => {
                self.record_warning(description, e);
                None
            }
        }
    }

    /// Run a critical operation.
    ///
    /// Failure is recorded and returned as [`ProvisionError::StepFailed`] so
    /// the caller can stop with `?`.
    pub async fn require<T, E, F>(&mut self, description: impl Into<String>, operation: F) -> Result<T>
    where
        E: Display,
        F: Future<Output = std::result::Result<T, E>>,
    {
        let description = description.into();
        match operation.await {
            Ok(value) => {
                self.record_applied(description);
                Ok(value)
            }
            Err(e) => {
                let reason = e.to_string();
                self.record_failed(description.clone(), &reason);
                Err(ProvisionError::step_failed(description, reason))
            }
        }
    }

    /// Records so far, in insertion order
    pub fn records(&self) -> &[SettingRecord] {
        &self.records
    }

    /// Consume the tracker into an immutable summary
    pub fn finish(self) -> RunSummary {
        RunSummary {
            records: self.records,
        }
    }
}

/// Immutable end-of-run snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    records: Vec<SettingRecord>,
}

impl RunSummary {
    /// Every record, in insertion order
    pub fn records(&self) -> &[SettingRecord] {
        &self.records
    }

    /// Descriptions of settings that were applied
    pub fn applied(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.outcome == Outcome::Applied)
            .map(|r| r.description.as_str())
            .collect()
    }

    /// Records with a warning outcome
    pub fn warnings(&self) -> Vec<&SettingRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Warning(_)))
            .collect()
    }

    /// Records with a failed outcome
    pub fn failures(&self) -> Vec<&SettingRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
            .collect()
    }

    /// True when nothing warned or failed
    pub fn is_clean(&self) -> bool {
        self.warnings().is_empty() && self.failures().is_empty()
    }

    /// Short totals line
    pub fn summary(&self) -> String {
        format!(
            "{} applied, {} warning(s), {} failed",
            self.applied().len(),
            self.warnings().len(),
            self.failures().len()
        )
    }
}
