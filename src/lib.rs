//! printlog - a print replacement that also keeps daily log files
//!
//! Every call is written to the console (optionally coloured) and appended to a log file
//! named after the current date, with a `[time] [TAG] ` prefix at the start of each line.
//! Old files are swept at startup and panics can be recorded in the same file.

pub mod config;
pub mod error;
pub mod logger;
pub mod logging;

pub use config::Config;
pub use error::{ConfigError, SinkError, SweepError};
pub use logger::{Logger, LoggerBuilder, Printer};
pub use logging::{Clock, ManualClock, PrintOptions, Severity, SystemClock, TimeZoneSetting};

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// In-memory console shared between a logger and the test
    #[derive(Clone, Default)]
    pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn new() -> Self {
            Self::default()
        }

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
}
