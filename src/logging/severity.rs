//! Severities and their resolved tag/colour table

use std::fmt;

use crate::config::Config;
use crate::error::ConfigError;

/// Key of the colour-table entry that resets console formatting
pub const RESET_KEY: &str = "reset";

/// Default reset sequence
pub const DEFAULT_RESET: &str = "\x1b[0m";

/// Severity of a log call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Plain print call: info tag, neutral colour
    Normal,
    Info,
    Success,
    Warning,
    Error,
    Critical,
    Debug,
}

impl Severity {
    /// Every severity, in table order
    pub const ALL: [Severity; 7] = [
        Severity::Normal,
        Severity::Info,
        Severity::Success,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Debug,
    ];

    /// Configuration key for this severity
    pub fn key(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Debug => "debug",
        }
    }

    /// Look up a severity by configuration key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.key() == key)
    }

    /// Built-in tag text
    pub fn default_tag(&self) -> &'static str {
        match self {
            Severity::Normal | Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
            Severity::Critical => "CRIT",
            Severity::Debug => "DEBUG",
        }
    }

    /// Built-in console colour
    pub fn default_color(&self) -> &'static str {
        match self {
            Severity::Normal => "\x1b[37m",
            Severity::Info => "\x1b[34m",
            Severity::Success => "\x1b[32m",
            Severity::Warning => "\x1b[33m",
            Severity::Error => "\x1b[31m",
            Severity::Critical => "\x1b[41m\x1b[37m",
            Severity::Debug => "\x1b[36m",
        }
    }

    /// Whether console output is flushed by default after each call
    pub fn flushes_by_default(&self) -> bool {
        matches!(self, Severity::Error | Severity::Critical)
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Tag and colour for one severity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityStyle {
    pub tag: String,
    pub color: String,
}

/// Tag/colour lookup resolved once at construction
///
/// Configured entries override the built-in ones; anything missing keeps its default.
#[derive(Debug, Clone)]
pub struct SeverityTable {
    styles: [SeverityStyle; 7],
    reset: String,
}

impl SeverityTable {
    /// Resolve and validate the tag and colour tables of a configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut tags: [Option<String>; 7] = Default::default();
        for (key, tag) in &config.tags {
            let severity = Severity::from_key(key)
                .ok_or_else(|| ConfigError::UnknownTagSeverity(key.clone()))?;
            tags[severity.index()] = Some(tag.clone());
        }

        let mut colors: [Option<String>; 7] = Default::default();
        let mut reset = None;
        for (key, color) in &config.colors {
            if !color.is_empty() && !color.starts_with('\x1b') {
                return Err(ConfigError::InvalidColor {
                    key: key.clone(),
                    value: color.clone(),
                });
            }
            if key == RESET_KEY {
                reset = Some(color.clone());
                continue;
            }
            let severity = Severity::from_key(key)
                .ok_or_else(|| ConfigError::UnknownColorSeverity(key.clone()))?;
            colors[severity.index()] = Some(color.clone());
        }

        // The plain call shares the info tag unless it has its own
        let info_tag = tags[Severity::Info.index()].clone();
        let styles = Severity::ALL.map(|severity| {
            let tag = tags[severity.index()]
                .take()
                .or_else(|| {
                    if severity == Severity::Normal {
                        info_tag.clone()
                    } else {
                        None
                    }
                })
                .unwrap_or_else(|| severity.default_tag().to_string());
            let color = colors[severity.index()]
                .take()
                .unwrap_or_else(|| severity.default_color().to_string());
            SeverityStyle { tag, color }
        });

        Ok(Self {
            styles,
            reset: reset.unwrap_or_else(|| DEFAULT_RESET.to_string()),
        })
    }

    /// Style for a severity
    pub fn style(&self, severity: Severity) -> &SeverityStyle {
        &self.styles[severity.index()]
    }

    /// Reset sequence
    pub fn reset(&self) -> &str {
        &self.reset
    }
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            styles: Severity::ALL.map(|severity| SeverityStyle {
                tag: severity.default_tag().to_string(),
                color: severity.default_color().to_string(),
            }),
            reset: DEFAULT_RESET.to_string(),
        }
    }
}
