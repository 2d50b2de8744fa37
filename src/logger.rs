//! Print-style logger facade
//!
//! A [`Logger`] is built from a [`Config`], owned by the application and shared by
//! reference (or through an `Arc`). Dropping it shuts it down.

use std::fmt::Display;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crossterm::tty::IsTty;

use crate::config::Config;
use crate::error::ConfigError;
use crate::logging::{
    Clock, ConsoleWriter, LineFormatter, PanicCapture, PrintOptions, RetentionSweeper,
    RotationManager, Severity, SeverityTable, SweepReport, SystemClock, WriteCoordinator,
};

/// Builder for a [`Logger`] with a custom console writer or clock
pub struct LoggerBuilder {
    config: Config,
    console: Option<ConsoleWriter>,
    console_terminal: Option<bool>,
    clock: Option<Arc<dyn Clock>>,
}

impl LoggerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            console: None,
            console_terminal: None,
            clock: None,
        }
    }

    /// Write console output here instead of stdout
    pub fn console(mut self, writer: impl Write + Send + 'static) -> Self {
        self.console = Some(Box::new(writer));
        self
    }

    /// Say whether the console is a terminal
    ///
    /// By default stdout is checked, and an injected writer counts as a terminal.
    /// Colours are turned off for a console that is not one.
    pub fn console_terminal(mut self, is_terminal: bool) -> Self {
        self.console_terminal = Some(is_terminal);
        self
    }

    /// Take time from this clock instead of the system clock
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Validate the configuration, sweep expired files and start the logger
    pub fn build(self) -> Result<Logger, ConfigError> {
        let LoggerBuilder {
            config,
            console,
            console_terminal,
            clock,
        } = self;
        config.validate()?;

        let table = SeverityTable::from_config(&config)?;
        let is_terminal =
            console_terminal.unwrap_or_else(|| console.is_some() || io::stdout().is_tty());
        let colors_degraded =
            config.use_console_colors && config.log_to_console && !is_terminal;
        let colors = config.use_console_colors && !colors_degraded;
        let formatter = LineFormatter::new(table, config.timestamp_fmt.clone(), colors);

        let console = if config.log_to_console {
            Some(console.unwrap_or_else(|| Box::new(io::stdout())))
        } else {
            None
        };
        let rotation = if config.log_to_file {
            Some(RotationManager::new(&config)?)
        } else {
            None
        };
        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock));

        let coordinator = Arc::new(WriteCoordinator::new(
            formatter,
            console,
            rotation,
            clock,
            config.timezone,
        ));
        if colors_degraded {
            tracing::info!("console is not a terminal, console colours disabled");
            coordinator.console_notice(
                Severity::Info,
                "Console colours disabled (output is not a terminal)",
            );
        }

        let sweep = if config.log_to_file {
            let sweeper =
                RetentionSweeper::new(&config.filename_fmt, &config.app_name, config.timezone);
            sweeper.sweep(
                &config.logs_dir,
                config.retention_days,
                &coordinator.now_local(),
            )
        } else {
            SweepReport::default()
        };
        if !sweep.deleted.is_empty() {
            tracing::info!(count = sweep.deleted.len(), "cleaned up expired log files");
        }

        let logger = Logger {
            coordinator,
            capture: Mutex::new(None),
            sweep,
            config,
        };
        if logger.config.capture_stderr {
            logger.install_panic_capture();
        }
        Ok(logger)
    }
}

/// Thread-safe print replacement that mirrors output into daily log files
pub struct Logger {
    coordinator: Arc<WriteCoordinator>,
    capture: Mutex<Option<PanicCapture>>,
    sweep: SweepReport,
    config: Config,
}

impl Logger {
    /// Logger writing to stdout with the system clock
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        LoggerBuilder::new(config).build()
    }

    pub fn builder(config: Config) -> LoggerBuilder {
        LoggerBuilder::new(config)
    }

    /// Configuration the logger was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Result of the retention sweep run at construction
    pub fn startup_sweep(&self) -> &SweepReport {
        &self.sweep
    }

    /// Override separator, terminator or flush for the next call
    pub fn with(&self, options: PrintOptions) -> Printer<'_> {
        Printer {
            logger: self,
            options,
        }
    }

    /// Log `parts` at `severity`
    pub fn log<I>(&self, severity: Severity, parts: I, options: &PrintOptions)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let message = options.join(parts);
        self.coordinator.emit(
            severity,
            message,
            &options.end,
            options.should_flush(severity),
        );
    }

    /// Plain print call
    pub fn print<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.log(Severity::Normal, parts, &PrintOptions::default());
    }

    pub fn info<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.log(Severity::Info, parts, &PrintOptions::default());
    }

    pub fn success<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.log(Severity::Success, parts, &PrintOptions::default());
    }

    pub fn warning<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.log(Severity::Warning, parts, &PrintOptions::default());
    }

    /// Error call; flushes the console by default
    pub fn error<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.log(Severity::Error, parts, &PrintOptions::default());
    }

    /// Critical call; flushes the console by default
    pub fn critical<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.log(Severity::Critical, parts, &PrintOptions::default());
    }

    pub fn debug<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.log(Severity::Debug, parts, &PrintOptions::default());
    }

    /// Flush console and file
    pub fn flush(&self) {
        self.coordinator.flush();
    }

    /// Path of the log file currently being written
    pub fn current_log_file(&self) -> Option<PathBuf> {
        self.coordinator.current_file()
    }

    /// Whether file output was given up after an open or write failure
    pub fn file_degraded(&self) -> bool {
        self.coordinator.file_degraded()
    }

    /// Start recording panics in the log file
    ///
    /// Returns `false` if this or another logger already captures panics.
    pub fn install_panic_capture(&self) -> bool {
        let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        if capture.is_some() {
            return false;
        }
        *capture = PanicCapture::install(Arc::downgrade(&self.coordinator));
        capture.is_some()
    }

    /// Stop recording panics and restore the previous hook
    pub fn uninstall_panic_capture(&self) {
        let capture = self
            .capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(capture) = capture {
            capture.uninstall();
        }
    }

    /// Whether this logger records panics
    pub fn captures_panics(&self) -> bool {
        self.capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(PanicCapture::is_active)
    }

    /// Close the log file and detach the panic hook
    ///
    /// Idempotent. Later calls still reach the console; the file side stays closed.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
        self.uninstall_panic_capture();
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A logger with per-call options applied
pub struct Printer<'a> {
    logger: &'a Logger,
    options: PrintOptions,
}

impl Printer<'_> {
    pub fn print<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.logger.log(Severity::Normal, parts, &self.options);
    }

    pub fn info<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.logger.log(Severity::Info, parts, &self.options);
    }

    pub fn success<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.logger.log(Severity::Success, parts, &self.options);
    }

    pub fn warning<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.logger.log(Severity::Warning, parts, &self.options);
    }

    pub fn error<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.logger.log(Severity::Error, parts, &self.options);
    }

    pub fn critical<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.logger.log(Severity::Critical, parts, &self.options);
    }

    pub fn debug<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.logger.log(Severity::Debug, parts, &self.options);
    }
}

/// Print-style call on a [`Logger`]
///
/// ```no_run
/// # use printlog::{lprint, Config, Logger};
/// let logger = Logger::new(Config::default()).unwrap();
/// lprint!(logger, "Loading modules"; end = "...");
/// lprint!(logger, "Done!");
/// lprint!(logger => warning, "High latency detected:", "450ms");
/// lprint!(logger => debug, 1, 2, 3; sep = ", ", flush = true);
/// ```
#[macro_export]
macro_rules! lprint {
    ($logger:expr => $level:ident $(, $part:expr)* $(; $($opt:ident = $value:expr),+ $(,)?)?) => {{
        let parts: &[&dyn ::std::fmt::Display] = &[$(&$part),*];
        $logger
            .with($crate::PrintOptions::default() $($(.$opt($value))+)?)
            .$level(parts)
    }};
    ($logger:expr $(, $part:expr)* $(; $($opt:ident = $value:expr),+ $(,)?)?) => {
        $crate::lprint!($logger => print $(, $part)* $(; $($opt = $value),+)?)
    };
}
