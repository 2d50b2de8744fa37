//! Configuration for the logger

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::{
    validate_strftime, EncodingErrors, FileBuffering, FileEncoding, Severity, SeverityTable,
    TimeZoneSetting, DEFAULT_RESET, RESET_KEY,
};

/// Logger configuration
///
/// Every field has a default, so a TOML file only needs the keys it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name, available to `filename_fmt` as `{app}`
    pub app_name: String,

    /// Directory where daily log files are written (created on demand)
    pub logs_dir: PathBuf,

    /// Timezone used for file rotation and line timestamps
    pub timezone: TimeZoneSetting,

    /// Files older than this many days are deleted at startup; `<= 0` keeps everything
    pub retention_days: i64,

    /// Mirror output into log files
    pub log_to_file: bool,

    /// Write output to stdout
    pub log_to_console: bool,

    /// Wrap console output in ANSI colour codes
    pub use_console_colors: bool,

    /// Record panic reports in the log file
    pub capture_stderr: bool,

    /// Encoding of the log file: "utf-8", "ascii" or "latin-1"
    pub file_encoding: String,

    /// What to do with unencodable characters: "strict", "replace" or "ignore"
    pub file_encoding_errors: String,

    /// 0 = unbuffered, 1 = line-buffered, n > 1 = n-byte buffer
    pub file_buffering: usize,

    /// strftime pattern for the daily file name
    pub filename_fmt: String,

    /// strftime pattern for the timestamp prefix of each line
    pub timestamp_fmt: String,

    /// Tag text per severity (`info`, `success`, `warning`, `error`, `critical`, `debug`, `normal`)
    pub tags: BTreeMap<String, String>,

    /// Escape sequence per severity, plus `reset`
    pub colors: BTreeMap<String, String>,
}

fn default_tags() -> BTreeMap<String, String> {
    Severity::ALL
        .iter()
        .filter(|s| **s != Severity::Normal)
        .map(|s| (s.key().to_string(), s.default_tag().to_string()))
        .collect()
}

fn default_colors() -> BTreeMap<String, String> {
    let mut colors: BTreeMap<String, String> = Severity::ALL
        .iter()
        .map(|s| (s.key().to_string(), s.default_color().to_string()))
        .collect();
    colors.insert(RESET_KEY.to_string(), DEFAULT_RESET.to_string());
    colors
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "app".to_string(),
            logs_dir: PathBuf::from("logs"),
            timezone: TimeZoneSetting::Utc,
            retention_days: 7,
            log_to_file: true,
            log_to_console: true,
            use_console_colors: true,
            capture_stderr: true,
            file_encoding: "utf-8".to_string(),
            file_encoding_errors: "replace".to_string(),
            file_buffering: 1,
            filename_fmt: "log_%Y-%m-%d.txt".to_string(),
            timestamp_fmt: "%H:%M:%S".to_string(),
            tags: default_tags(),
            colors: default_colors(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid logger configuration")?;
        Ok(config)
    }

    /// Load configuration from a TOML file, or return the default if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check everything that would otherwise only fail at emit time
    pub fn validate(&self) -> Result<(), ConfigError> {
        SeverityTable::from_config(self)?;
        FileEncoding::parse(&self.file_encoding)?;
        EncodingErrors::parse(&self.file_encoding_errors)?;
        validate_strftime("timestamp_fmt", &self.timestamp_fmt)?;
        validate_strftime("filename_fmt", &self.filename_fmt)?;
        if self.filename_fmt.trim().is_empty() {
            return Err(ConfigError::EmptyFilename);
        }
        Ok(())
    }

    /// Buffering mode for the file sink
    pub fn buffering(&self) -> FileBuffering {
        FileBuffering::from_size(self.file_buffering)
    }
}
