#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use printlog::{Config, Logger, ManualClock};
use tempfile::TempDir;

/// In-memory console shared between a logger and the test
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn noon_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
}

pub fn config(temp_dir: &TempDir, capture_stderr: bool) -> Config {
    Config {
        logs_dir: temp_dir.path().join("logs"),
        use_console_colors: false,
        capture_stderr,
        ..Config::default()
    }
}

pub fn logger(config: Config, console: &SharedBuffer, clock: &ManualClock) -> Logger {
    Logger::builder(config)
        .console(console.clone())
        .clock(clock.clone())
        .build()
        .unwrap()
}
