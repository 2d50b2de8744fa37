//! Rendering of log text for the console and the file

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset};

use crate::error::ConfigError;

use super::severity::{Severity, SeverityTable};

/// Reject strftime patterns chrono cannot render
pub fn validate_strftime(field: &'static str, pattern: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidPattern {
            field,
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

/// Text of one write, per destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Console text, coloured when colours are on
    pub display: String,
    /// File text, never coloured
    pub plain: String,
}

/// Builds the literal text of a log write
///
/// A fresh write gets `[<timestamp>] [<tag>] ` in front of it; a continuation is passed
/// through untouched, embedded newlines included.
#[derive(Debug, Clone)]
pub struct LineFormatter {
    table: SeverityTable,
    timestamp_fmt: String,
    colors: bool,
}

impl LineFormatter {
    pub fn new(table: SeverityTable, timestamp_fmt: impl Into<String>, colors: bool) -> Self {
        Self {
            table,
            timestamp_fmt: timestamp_fmt.into(),
            colors,
        }
    }

    pub fn colors_enabled(&self) -> bool {
        self.colors
    }

    /// Turn colours off for the rest of the process
    pub fn disable_colors(&mut self) {
        self.colors = false;
    }

    /// Timestamp and tag prefix of a fresh line
    pub fn prefix(&self, severity: Severity, now: &DateTime<FixedOffset>) -> String {
        let mut prefix = String::from("[");
        // Patterns are validated at construction, a formatting error only loses the timestamp
        let _ = write!(prefix, "{}", now.format(&self.timestamp_fmt));
        prefix.push_str("] [");
        prefix.push_str(&self.table.style(severity).tag);
        prefix.push_str("] ");
        prefix
    }

    /// Render `text` for both destinations with the same freshness
    pub fn render(
        &self,
        severity: Severity,
        text: &str,
        fresh: bool,
        now: &DateTime<FixedOffset>,
    ) -> Rendered {
        Rendered {
            display: self.display(severity, text, fresh, now),
            plain: self.plain(severity, text, fresh, now),
        }
    }

    /// File text
    pub fn plain(
        &self,
        severity: Severity,
        text: &str,
        fresh: bool,
        now: &DateTime<FixedOffset>,
    ) -> String {
        if fresh {
            let mut out = self.prefix(severity, now);
            out.push_str(text);
            out
        } else {
            text.to_string()
        }
    }

    /// Console text
    ///
    /// A leading carriage return stays in front of the colour code so the terminal
    /// still rewrites the current line.
    pub fn display(
        &self,
        severity: Severity,
        text: &str,
        fresh: bool,
        now: &DateTime<FixedOffset>,
    ) -> String {
        let (carriage_return, body) = match text.strip_prefix('\r') {
            Some(rest) => ("\r", rest),
            None => ("", text),
        };

        let mut out = String::with_capacity(text.len() + 32);
        out.push_str(carriage_return);
        if self.colors {
            out.push_str(&self.table.style(severity).color);
        }
        if fresh {
            out.push_str(&self.prefix(severity, now));
        }
        out.push_str(body);
        if self.colors {
            out.push_str(self.table.reset());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 12, 34, 56)
            .unwrap()
    }

    fn formatter(colors: bool) -> LineFormatter {
        LineFormatter::new(SeverityTable::default(), "%H:%M:%S", colors)
    }

    #[test]
    fn test_validate_strftime() {
        assert!(validate_strftime("timestamp_fmt", "%H:%M:%S").is_ok());
        assert!(validate_strftime("filename_fmt", "log_%Y-%m-%d.txt").is_ok());
        assert!(validate_strftime("timestamp_fmt", "%Q").is_err());
    }

    #[test]
    fn test_fresh_line_gets_prefix() {
        let rendered = formatter(false).render(Severity::Info, "hello\n", true, &noon());
        assert_eq!(rendered.plain, "[12:34:56] [INFO] hello\n");
        assert_eq!(rendered.display, rendered.plain);
    }

    #[test]
    fn test_continuation_has_no_prefix() {
        let rendered = formatter(false).render(Severity::Warning, "Done!\n", false, &noon());
        assert_eq!(rendered.plain, "Done!\n");
        assert_eq!(rendered.display, "Done!\n");
    }

    #[test]
    fn test_embedded_newlines_are_verbatim() {
        let plain = formatter(false).plain(Severity::Debug, "a\nb\nc\n", true, &noon());
        assert_eq!(plain, "[12:34:56] [DEBUG] a\nb\nc\n");
    }

    #[test]
    fn test_colors_only_on_console() {
        let rendered = formatter(true).render(Severity::Error, "boom\n", true, &noon());
        assert_eq!(rendered.plain, "[12:34:56] [ERROR] boom\n");
        assert_eq!(
            rendered.display,
            "\x1b[31m[12:34:56] [ERROR] boom\n\x1b[0m"
        );
    }

    #[test]
    fn test_carriage_return_precedes_color() {
        let display = formatter(true).display(Severity::Normal, "\r50%", true, &noon());
        assert_eq!(display, "\r\x1b[37m[12:34:56] [INFO] 50%\x1b[0m");
    }

    #[test]
    fn test_disable_colors() {
        let mut f = formatter(true);
        assert!(f.colors_enabled());
        f.disable_colors();
        assert_eq!(
            f.display(Severity::Success, "ok\n", true, &noon()),
            "[12:34:56] [SUCCESS] ok\n"
        );
    }
}
