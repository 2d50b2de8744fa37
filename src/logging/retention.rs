//! Log file retention management
//!
//! Handles cleanup of old log files based on age. A file's date comes from its name
//! when it matches the file name pattern, otherwise from its modification time.

use std::fs::{self, DirEntry};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::error::SweepError;

use super::clock::TimeZoneSetting;
use super::rotation::APP_PLACEHOLDER;

/// Outcome of one sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Files that were removed
    pub deleted: Vec<PathBuf>,
    /// Files that should have been removed but could not be
    pub failed: Vec<SweepError>,
}

/// Deletes log files older than the retention window
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    /// `filename_fmt` with `{app}` already substituted, usable for parsing
    name_pattern: String,
    timezone: TimeZoneSetting,
}

impl RetentionSweeper {
    pub fn new(filename_fmt: &str, app_name: &str, timezone: TimeZoneSetting) -> Self {
        Self {
            name_pattern: filename_fmt.replace(APP_PLACEHOLDER, &app_name.replace('%', "%%")),
            timezone,
        }
    }

    /// Remove every file in `logs_dir` dated before `today - retention_days`
    ///
    /// `retention_days <= 0` disables deletion. Per-file failures are collected and
    /// the sweep carries on.
    pub fn sweep(
        &self,
        logs_dir: &Path,
        retention_days: i64,
        now: &DateTime<FixedOffset>,
    ) -> SweepReport {
        self.sweep_with(logs_dir, retention_days, now, |path| fs::remove_file(path))
    }

    fn sweep_with<F>(
        &self,
        logs_dir: &Path,
        retention_days: i64,
        now: &DateTime<FixedOffset>,
        mut remove: F,
    ) -> SweepReport
    where
        F: FnMut(&Path) -> io::Result<()>,
    {
        let mut report = SweepReport::default();
        if retention_days <= 0 || !logs_dir.exists() {
            return report;
        }

        let today = now.date_naive();
        let cutoff = u64::try_from(retention_days)
            .ok()
            .and_then(|days| today.checked_sub_days(Days::new(days)))
            .unwrap_or(NaiveDate::MIN);

        let entries = match fs::read_dir(logs_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %logs_dir.display(), error = %e, "cannot list logs directory");
                return report;
            }
        };

        for entry in entries.flatten() {
            let Some(date) = self.entry_date(&entry) else {
                continue;
            };
            if date >= cutoff {
                continue;
            }

            let path = entry.path();
            match remove(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), %date, "deleted expired log file");
                    report.deleted.push(path);
                }
                Err(source) => {
                    tracing::warn!(path = %path.display(), error = %source, "failed to delete expired log file");
                    report.failed.push(SweepError { path, source });
                }
            }
        }

        report
    }

    /// Date of a directory entry, `None` for anything that is not a regular file
    fn entry_date(&self, entry: &DirEntry) -> Option<NaiveDate> {
        let metadata = entry.metadata().ok()?;
        if !metadata.is_file() {
            return None;
        }

        if let Some(date) = entry.file_name().to_str().and_then(|n| self.parse_name(n)) {
            return Some(date);
        }

        let modified: DateTime<Utc> = metadata.modified().ok()?.into();
        Some(self.timezone.localize(modified).date_naive())
    }

    /// Date embedded in a file name produced by the name pattern
    pub fn parse_name(&self, name: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(name, &self.name_pattern)
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(name, &self.name_pattern)
                    .ok()
                    .map(|dt| dt.date())
            })
    }
}
