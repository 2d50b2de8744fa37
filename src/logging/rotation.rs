//! Daily log file rotation
//!
//! The file name is derived from the local date, so crossing midnight in the configured
//! timezone changes the path and the next write moves to a new file.

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::config::Config;
use crate::error::{ConfigError, SinkError};

use super::encoding::{EncodingErrors, FileBuffering, FileEncoding};

/// Placeholder in `filename_fmt` replaced with the application name
pub const APP_PLACEHOLDER: &str = "{app}";

/// The file currently receiving writes
#[derive(Debug)]
struct OpenLog {
    path: PathBuf,
    date: NaiveDate,
    writer: BufWriter<File>,
}

/// Owns the log file handle and swaps it when the date changes
#[derive(Debug)]
pub struct RotationManager {
    logs_dir: PathBuf,
    app_name: String,
    filename_fmt: String,
    encoding: FileEncoding,
    errors: EncodingErrors,
    buffering: FileBuffering,
    current: Option<OpenLog>,
}

impl RotationManager {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            logs_dir: config.logs_dir.clone(),
            app_name: config.app_name.clone(),
            filename_fmt: config.filename_fmt.clone(),
            encoding: FileEncoding::parse(&config.file_encoding)?,
            errors: EncodingErrors::parse(&config.file_encoding_errors)?,
            buffering: config.buffering(),
            current: None,
        })
    }

    /// Directory holding the log files
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Path of the file that should receive a write made at `now`
    pub fn current_path(&self, now: &DateTime<FixedOffset>) -> PathBuf {
        self.logs_dir.join(render_filename(
            &self.filename_fmt,
            &self.app_name,
            now,
        ))
    }

    /// Path of the open file, if any
    pub fn open_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    /// Local date the open file belongs to
    pub fn open_date(&self) -> Option<NaiveDate> {
        self.current.as_ref().map(|log| log.date)
    }

    /// Make sure the open file is the one for `now`, rotating if needed
    ///
    /// The previous file is flushed and closed before the new one is opened.
    pub fn ensure_open(&mut self, now: &DateTime<FixedOffset>) -> Result<(), SinkError> {
        let path = self.current_path(now);
        if self.open_path() == Some(path.as_path()) {
            return Ok(());
        }

        if let Some(previous) = self.current.take() {
            tracing::debug!(
                from = %previous.path.display(),
                to = %path.display(),
                "rotating log file"
            );
            close_log(previous)?;
        }

        fs::create_dir_all(&self.logs_dir).map_err(|source| SinkError::CreateDir {
            path: self.logs_dir.clone(),
            source,
        })?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "opened log file");
        self.current = Some(OpenLog {
            path,
            date: now.date_naive(),
            writer: BufWriter::with_capacity(self.buffering.capacity(), file),
        });
        Ok(())
    }

    /// Append text to the open file
    ///
    /// Does nothing when no file is open.
    pub fn write(&mut self, text: &str, flush: bool) -> Result<(), SinkError> {
        let Some(log) = self.current.as_mut() else {
            return Ok(());
        };
        let bytes = self.encoding.encode(text, self.errors)?;
        let result = log.writer.write_all(&bytes).and_then(|_| {
            if flush || self.buffering.flush_after(text) {
                log.writer.flush()
            } else {
                Ok(())
            }
        });
        result.map_err(|source| SinkError::Write {
            path: log.path.clone(),
            source,
        })
    }

    /// Push buffered bytes to disk
    pub fn flush(&mut self) -> Result<(), SinkError> {
        match self.current.as_mut() {
            Some(log) => log.writer.flush().map_err(|source| SinkError::Write {
                path: log.path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Flush and close the open file; safe to call repeatedly
    pub fn close(&mut self) -> Result<(), SinkError> {
        match self.current.take() {
            Some(log) => close_log(log),
            None => Ok(()),
        }
    }
}

fn close_log(log: OpenLog) -> Result<(), SinkError> {
    let OpenLog { path, writer, .. } = log;
    writer
        .into_inner()
        .map(drop)
        .map_err(|e| SinkError::Write {
            path,
            source: e.into_error(),
        })
}

/// Render a file name pattern for a local time
pub fn render_filename(pattern: &str, app_name: &str, now: &DateTime<FixedOffset>) -> String {
    let mut name = String::new();
    let _ = write!(name, "{}", now.format(pattern));
    name.replace(APP_PLACEHOLDER, app_name)
}
