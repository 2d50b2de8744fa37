//! Wall-clock source and timezone handling

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, FixedOffset, Local, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
///
/// Cloned handles share the same time, so a test can keep one and hand the other to a logger.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Timezone used for rotation dates and line timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeZoneSetting {
    #[default]
    Utc,
    /// The host's local timezone, re-evaluated on every call
    Local,
    Fixed(FixedOffset),
    /// An IANA zone such as `America/New_York`; follows its daylight-saving rules
    Named(Tz),
}

impl TimeZoneSetting {
    /// Convert a UTC instant to wall-clock time in this zone
    pub fn localize(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            TimeZoneSetting::Utc => now.fixed_offset(),
            TimeZoneSetting::Local => now.with_timezone(&Local).fixed_offset(),
            TimeZoneSetting::Fixed(offset) => now.with_timezone(offset),
            TimeZoneSetting::Named(tz) => now.with_timezone(tz).fixed_offset(),
        }
    }
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    if !rest.is_ascii() {
        return None;
    }
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    if hours.is_empty() || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl FromStr for TimeZoneSetting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "utc" | "z" | "gmt" => Ok(TimeZoneSetting::Utc),
            "local" => Ok(TimeZoneSetting::Local),
            _ => parse_offset(trimmed)
                .map(TimeZoneSetting::Fixed)
                .or_else(|| trimmed.parse::<Tz>().ok().map(TimeZoneSetting::Named))
                .ok_or_else(|| ConfigError::InvalidTimezone(s.to_string())),
        }
    }
}

impl TryFrom<String> for TimeZoneSetting {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeZoneSetting> for String {
    fn from(value: TimeZoneSetting) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeZoneSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZoneSetting::Utc => f.write_str("utc"),
            TimeZoneSetting::Local => f.write_str("local"),
            TimeZoneSetting::Fixed(offset) => write!(f, "{}", offset),
            TimeZoneSetting::Named(tz) => f.write_str(tz.name()),
        }
    }
}
