//! Per-call log records and print-style options

use std::fmt::{Display, Write as _};

use chrono::{DateTime, Utc};

use super::severity::Severity;

/// One log call, created under the write lock and consumed immediately
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub severity: Severity,
    /// Joined message parts
    pub message: String,
    /// Appended after the message; may be empty
    pub terminator: String,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        terminator: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            terminator: terminator.into(),
            created_at,
        }
    }

    /// Message followed by the terminator
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.message.len() + self.terminator.len());
        text.push_str(&self.message);
        text.push_str(&self.terminator);
        text
    }

    /// Whether the next write starts a new line
    ///
    /// Only the terminator counts; newlines inside the message do not.
    pub fn ends_line(&self) -> bool {
        self.terminator.ends_with('\n')
    }
}

/// Separator, terminator and flush overrides of a print-style call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    pub sep: String,
    pub end: String,
    /// `None` uses the severity's default
    pub flush: Option<bool>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            sep: " ".to_string(),
            end: "\n".to_string(),
            flush: None,
        }
    }
}

impl PrintOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sep(mut self, sep: impl Into<String>) -> Self {
        self.sep = sep.into();
        self
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = end.into();
        self
    }

    pub fn flush(mut self, flush: bool) -> Self {
        self.flush = Some(flush);
        self
    }

    /// Join message parts with the separator
    pub fn join<I>(&self, parts: I) -> String
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let mut message = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                message.push_str(&self.sep);
            }
            let _ = write!(message, "{}", part);
        }
        message
    }

    /// Effective flush flag for a severity
    pub fn should_flush(&self, severity: Severity) -> bool {
        self.flush.unwrap_or_else(|| severity.flushes_by_default())
    }
}
