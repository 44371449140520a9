//! Plain-text run log written next to the user's other files.

use crate::apply::{CheckResult, RunSummary, SettingRecord};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Append-only log of one command's records and checks.
///
/// Cloning shares the same file. Write failures are logged and otherwise
/// ignored so a full disk never aborts provisioning.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl RunLog {
    /// Create `macprov-<command>-<timestamp>.log` in `dir`
    pub fn create(dir: &Path, command: &str) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let path = dir.join(format!("macprov-{command}-{stamp}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let log = Self {
            path,
            file: Arc::new(Mutex::new(file)),
        };
        log.line(&format!("macprov {command} started"));
        Ok(log)
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make `user` the owner of the log file
    #[cfg(unix)]
    pub fn hand_to(&self, user: &str) -> io::Result<()> {
        let account = users::get_user_by_name(user).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such user '{user}'"))
        })?;
        std::os::unix::fs::chown(&self.path, Some(account.uid()), Some(account.primary_group_id()))
    }

    /// Make `user` the owner of the log file
    #[cfg(not(unix))]
    pub fn hand_to(&self, _user: &str) -> io::Result<()> {
        Ok(())
    }

    /// Append one timestamped line
    pub fn line(&self, message: &str) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let result = match self.file.lock() {
            Ok(mut file) => writeln!(file, "[{stamp}] {message}"),
            Err(_) => Ok(()),
        };
        if let Err(e) = result {
            log::warn!("Failed to write run log {}: {}", self.path.display(), e);
        }
    }

    /// Append a setting record
    pub fn record(&self, record: &SettingRecord) {
        self.line(&record.format_result());
    }

    /// Append a verification result
    pub fn check(&self, result: &CheckResult) {
        self.line(&format!("verify: {}", result.format_result()));
    }

    /// Append the end-of-run summary with every warning and failure repeated
    pub fn summary(&self, summary: &RunSummary) {
        self.line(&format!("summary: {}", summary.summary()));
        for record in summary.warnings().into_iter().chain(summary.failures()) {
            self.line(&format!("  {}", record.format_result()));
        }
    }
}
