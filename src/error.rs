//! Error types for the logger
//!
//! Only [`ConfigError`] ever reaches a caller. Sink and sweep errors are recovered
//! inside the write pipeline and surface at most as a one-time notice.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid configuration, detected while constructing a logger
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown severity '{0}' in tag table")]
    UnknownTagSeverity(String),

    #[error("unknown severity '{0}' in colour table")]
    UnknownColorSeverity(String),

    #[error("colour for '{key}' is not an escape sequence: {value:?}")]
    InvalidColor { key: String, value: String },

    #[error("invalid {field} pattern '{pattern}'")]
    InvalidPattern { field: &'static str, pattern: String },

    #[error("filename pattern renders to an empty name")]
    EmptyFilename,

    #[error("unsupported file encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("unsupported encoding error strategy '{0}'")]
    UnsupportedEncodingErrors(String),

    #[error(
        "invalid timezone '{0}' (expected \"utc\", \"local\", an offset like \"+05:30\" or a name like \"America/New_York\")"
    )]
    InvalidTimezone(String),
}

/// Failure on the file side of the pipeline
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create logs directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log file {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write log file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("character {ch:?} cannot be encoded as {encoding}")]
    Encode { ch: char, encoding: &'static str },
}

impl SinkError {
    /// Underlying IO error, if any
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            SinkError::CreateDir { source, .. }
            | SinkError::Open { source, .. }
            | SinkError::Write { source, .. } => Some(source),
            SinkError::Encode { .. } => None,
        }
    }

    /// One-line message suitable for the degradation notice
    pub fn notice(&self) -> String {
        match self.io_error() {
            Some(e) => friendly_io_error_message(e, &self.to_string()),
            None => self.to_string(),
        }
    }
}

/// A log file that could not be removed during the retention sweep
#[derive(Debug, Error)]
#[error("failed to delete expired log file {path}")]
pub struct SweepError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Categories of disk errors for user-friendly messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a user-friendly message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full",
            DiskErrorKind::PermissionDenied => "permission denied",
            DiskErrorKind::NotFound => "file or directory not found",
            DiskErrorKind::Other => "I/O error",
        }
    }
}

/// Categorize an IO error into a user-friendly category
pub fn categorize_io_error(e: &std::io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::StorageFull | ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28, EDQUOT = 122 on Linux and 69 on macOS
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Create a user-friendly error message from an IO error
pub fn friendly_io_error_message(e: &std::io::Error, context: &str) -> String {
    match categorize_io_error(e) {
        DiskErrorKind::Other => format!("{}: {}", context, e),
        kind => format!("{}: {}", context, kind.user_message()),
    }
}
