//! Serialized dual-destination writer
//!
//! Every write, from any thread and any severity, goes through one mutex. Inside that
//! critical section the file is rotated if the date changed, the text is rendered for
//! each destination according to that destination's fresh-line state, and both sinks
//! are written. Nothing in here returns an error to the caller.

use std::cell::Cell;
use std::io::Write;
use std::mem;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset};

use crate::error::SinkError;

use super::clock::{Clock, TimeZoneSetting};
use super::formatter::LineFormatter;
use super::record::LogRecord;
use super::rotation::RotationManager;
use super::severity::Severity;

/// Console destination
pub type ConsoleWriter = Box<dyn Write + Send>;

thread_local! {
    static IN_EMIT: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the critical section
///
/// A write attempted from within a write (a console writer that logs, a panic raised
/// while holding the lock) would deadlock on the mutex, so it is dropped instead.
/// The flag is per thread, not per coordinator: letting a nested write into another
/// coordinator through would allow two threads to take two write locks in opposite
/// orders.
struct EmitGuard;

impl EmitGuard {
    fn enter() -> Option<Self> {
        IN_EMIT.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(EmitGuard)
            }
        })
    }
}

impl Drop for EmitGuard {
    fn drop(&mut self) {
        IN_EMIT.with(|flag| flag.set(false));
    }
}

/// Whether the current thread is already writing through a coordinator
pub fn in_emit() -> bool {
    IN_EMIT.with(Cell::get)
}

/// Destinations of one write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Targets {
    pub console: bool,
    pub file: bool,
}

impl Targets {
    pub const ALL: Targets = Targets {
        console: true,
        file: true,
    };

    pub const FILE_ONLY: Targets = Targets {
        console: false,
        file: true,
    };
}

/// State of the file side
#[derive(Debug)]
enum FileSink {
    /// File logging is turned off in the configuration
    Off,
    Open(RotationManager),
    /// Opening or writing failed; console only for the rest of the process
    Degraded,
    /// `shutdown()` ran; further file writes are dropped
    Closed,
}

/// Everything guarded by the write lock
struct State {
    formatter: LineFormatter,
    console: Option<ConsoleWriter>,
    file: FileSink,
    console_fresh: bool,
    file_fresh: bool,
}

/// The synchronization point of the logger
pub struct WriteCoordinator {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    timezone: TimeZoneSetting,
}

impl WriteCoordinator {
    /// `console` is `None` when console output is disabled, `rotation` is `None` when
    /// file output is disabled
    pub fn new(
        formatter: LineFormatter,
        console: Option<ConsoleWriter>,
        rotation: Option<RotationManager>,
        clock: Arc<dyn Clock>,
        timezone: TimeZoneSetting,
    ) -> Self {
        let file = match rotation {
            Some(rotation) => FileSink::Open(rotation),
            None => FileSink::Off,
        };
        Self {
            state: Mutex::new(State {
                formatter,
                console,
                file,
                console_fresh: true,
                file_fresh: true,
            }),
            clock,
            timezone,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current wall-clock time in the configured timezone
    pub fn now_local(&self) -> DateTime<FixedOffset> {
        self.timezone.localize(self.clock.now())
    }

    /// Write `message` followed by `terminator` to every enabled destination
    ///
    /// Calls made on this thread while it is already inside any coordinator's write,
    /// for example from a console writer that logs through another logger, are dropped.
    pub fn emit(&self, severity: Severity, message: String, terminator: &str, flush: bool) {
        let Some(_guard) = EmitGuard::enter() else {
            return;
        };
        let mut state = self.lock();
        let record = LogRecord::new(severity, message, terminator, self.clock.now());
        self.write_record(&mut state, &record, Targets::ALL, flush, false);
    }

    /// Write each line as its own error entry on the file side
    ///
    /// Every line starts fresh, closing any line a previous call left open. The lines
    /// are written under a single lock acquisition so they stay contiguous.
    pub fn emit_error_lines(&self, text: &str) {
        let Some(_guard) = EmitGuard::enter() else {
            return;
        };
        let mut state = self.lock();
        for line in text.lines() {
            let record = LogRecord::new(Severity::Error, line, "\n", self.clock.now());
            self.write_record(&mut state, &record, Targets::FILE_ONLY, true, true);
        }
    }

    fn write_record(
        &self,
        state: &mut State,
        record: &LogRecord,
        targets: Targets,
        flush: bool,
        force_fresh: bool,
    ) {
        let text = record.text();
        if text.is_empty() {
            return;
        }
        let now = self.timezone.localize(record.created_at);
        let ends_line = record.ends_line();

        if targets.file {
            state.write_file(record.severity, &text, ends_line, &now, flush, force_fresh);
        }
        if targets.console {
            state.write_console(record.severity, &text, ends_line, &now, flush);
        }
    }

    /// Write a one-off notice to the console only, on a line of its own
    pub fn console_notice(&self, severity: Severity, message: &str) {
        let Some(_guard) = EmitGuard::enter() else {
            return;
        };
        let now = self.now_local();
        self.lock().console_notice(severity, message, &now);
    }

    /// Flush both destinations
    pub fn flush(&self) {
        let Some(_guard) = EmitGuard::enter() else {
            return;
        };
        let mut state = self.lock();
        if let FileSink::Open(rotation) = &mut state.file {
            if let Err(e) = rotation.flush() {
                tracing::warn!(error = %e, "failed to flush log file");
            }
        }
        if let Some(console) = state.console.as_mut() {
            let _ = console.flush();
        }
    }

    /// Flush and close the file; later writes only reach the console
    ///
    /// Safe to call any number of times.
    pub fn shutdown(&self) {
        let Some(_guard) = EmitGuard::enter() else {
            return;
        };
        let mut state = self.lock();
        if let FileSink::Open(mut rotation) = mem::replace(&mut state.file, FileSink::Closed) {
            if let Err(e) = rotation.close() {
                tracing::warn!(error = %e, "failed to close log file");
            }
        }
        if let Some(console) = state.console.as_mut() {
            let _ = console.flush();
        }
    }

    /// Path of the open log file
    pub fn current_file(&self) -> Option<PathBuf> {
        match &self.lock().file {
            FileSink::Open(rotation) => rotation.open_path().map(PathBuf::from),
            _ => None,
        }
    }

    /// Whether file output was given up after a failure
    pub fn file_degraded(&self) -> bool {
        matches!(self.lock().file, FileSink::Degraded)
    }

    /// Whether `shutdown()` has run
    pub fn is_shut_down(&self) -> bool {
        matches!(self.lock().file, FileSink::Closed)
    }
}

impl State {
    fn write_file(
        &mut self,
        severity: Severity,
        text: &str,
        ends_line: bool,
        now: &DateTime<FixedOffset>,
        flush: bool,
        force_fresh: bool,
    ) {
        let opened = match &mut self.file {
            FileSink::Open(rotation) => rotation.ensure_open(now),
            _ => return,
        };
        if let Err(e) = opened {
            self.degrade(&e, now);
            return;
        }

        let mut out = String::new();
        let mut fresh = self.file_fresh;
        let mut body = text;
        // The file is append-only: a carriage-return rewrite becomes a new entry
        if let Some(rest) = text.strip_prefix('\r') {
            body = rest;
            if !fresh {
                out.push('\n');
                fresh = true;
            }
        }
        if force_fresh && !fresh {
            out.push('\n');
            fresh = true;
        }
        out.push_str(&self.formatter.plain(severity, body, fresh, now));

        let written = match &mut self.file {
            FileSink::Open(rotation) => rotation.write(&out, flush),
            _ => return,
        };
        match written {
            Ok(()) => self.file_fresh = ends_line,
            Err(e @ SinkError::Encode { .. }) => {
                tracing::warn!(error = %e, "dropped log line that cannot be encoded");
            }
            Err(e) => self.degrade(&e, now),
        }
    }

    fn write_console(
        &mut self,
        severity: Severity,
        text: &str,
        ends_line: bool,
        now: &DateTime<FixedOffset>,
        flush: bool,
    ) {
        let Some(console) = self.console.as_mut() else {
            return;
        };
        let fresh = self.console_fresh || text.starts_with('\r');
        let display = self.formatter.display(severity, text, fresh, now);
        let result = console
            .write_all(display.as_bytes())
            .and_then(|_| if flush { console.flush() } else { Ok(()) });
        if let Err(e) = result {
            tracing::debug!(error = %e, "console write failed");
        }
        self.console_fresh = ends_line;
    }

    /// Give up on the file and say so once
    fn degrade(&mut self, error: &SinkError, now: &DateTime<FixedOffset>) {
        if let FileSink::Open(mut rotation) = mem::replace(&mut self.file, FileSink::Degraded) {
            let _ = rotation.close();
        }
        tracing::warn!(error = %error, "file logging disabled");
        self.console_notice(
            Severity::Warning,
            &format!("File logging disabled ({})", error.notice()),
            now,
        );
    }

    /// Closes an open console line first; the file side is untouched
    fn console_notice(&mut self, severity: Severity, message: &str, now: &DateTime<FixedOffset>) {
        let Some(console) = self.console.as_mut() else {
            return;
        };
        let mut notice = String::new();
        if !self.console_fresh {
            notice.push('\n');
        }
        notice.push_str(
            &self
                .formatter
                .display(severity, &format!("{message}\n"), true, now),
        );
        let _ = console
            .write_all(notice.as_bytes())
            .and_then(|_| console.flush());
        self.console_fresh = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::logging::clock::ManualClock;
    use crate::logging::severity::SeverityTable;
    use crate::test_support::SharedBuffer;
    use chrono::{Duration, TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        coordinator: WriteCoordinator,
        console: SharedBuffer,
        clock: ManualClock,
        _temp_dir: TempDir,
        logs_dir: PathBuf,
    }

    impl Harness {
        fn new(log_to_file: bool, log_to_console: bool) -> Self {
            let temp_dir = TempDir::new().unwrap();
            let logs_dir = temp_dir.path().join("logs");
            let config = Config {
                logs_dir: logs_dir.clone(),
                ..Config::default()
            };
            Self::with_config(temp_dir, logs_dir, &config, log_to_file, log_to_console)
        }

        fn with_config(
            temp_dir: TempDir,
            logs_dir: PathBuf,
            config: &Config,
            log_to_file: bool,
            log_to_console: bool,
        ) -> Self {
            let console = SharedBuffer::new();
            let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
            let formatter = LineFormatter::new(SeverityTable::default(), "%H:%M:%S", false);
            let rotation = log_to_file.then(|| RotationManager::new(config).unwrap());
            let console_writer =
                log_to_console.then(|| Box::new(console.clone()) as ConsoleWriter);
            let coordinator = WriteCoordinator::new(
                formatter,
                console_writer,
                rotation,
                Arc::new(clock.clone()),
                TimeZoneSetting::Utc,
            );
            Self {
                coordinator,
                console,
                clock,
                _temp_dir: temp_dir,
                logs_dir,
            }
        }

        fn file(&self, name: &str) -> String {
            fs::read_to_string(self.logs_dir.join(name)).unwrap_or_default()
        }
    }

    #[test]
    fn test_partial_line_is_continued_without_prefix() {
        let h = Harness::new(true, true);
        h.coordinator
            .emit(Severity::Info, "Loading modules".into(), "...", false);
        h.coordinator.emit(Severity::Info, "Done!".into(), "\n", false);

        let expected = "[12:00:00] [INFO] Loading modules...Done!\n";
        assert_eq!(h.console.contents(), expected);
        assert_eq!(h.file("log_2024-06-01.txt"), expected);
    }

    #[test]
    fn test_newline_terminator_starts_fresh_line() {
        let h = Harness::new(true, true);
        h.coordinator.emit(Severity::Info, "one".into(), "\n", false);
        h.coordinator
            .emit(Severity::Warning, "two".into(), "\n", false);

        assert_eq!(
            h.console.contents(),
            "[12:00:00] [INFO] one\n[12:00:00] [WARN] two\n"
        );
    }

    #[test]
    fn test_embedded_newline_does_not_end_line() {
        let h = Harness::new(true, false);
        h.coordinator
            .emit(Severity::Debug, "a\nb\n".into(), "", false);
        h.coordinator.emit(Severity::Debug, "c".into(), "\n", false);

        assert_eq!(h.file("log_2024-06-01.txt"), "[12:00:00] [DEBUG] a\nb\nc\n");
    }

    #[test]
    fn test_file_disabled_writes_console_only() {
        let h = Harness::new(false, true);
        h.coordinator.emit(Severity::Success, "ok".into(), "\n", false);

        assert_eq!(h.console.contents(), "[12:00:00] [SUCCESS] ok\n");
        assert!(!h.logs_dir.exists());
        assert!(h.coordinator.current_file().is_none());
    }

    #[test]
    fn test_rotation_splits_by_local_date() {
        let h = Harness::new(true, false);
        h.clock
            .set(Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 59).unwrap());
        h.coordinator.emit(Severity::Info, "before".into(), "\n", false);
        h.clock.advance(Duration::seconds(2));
        h.coordinator.emit(Severity::Info, "after".into(), "\n", false);

        assert_eq!(
            h.file("log_2024-06-01.txt"),
            "[23:59:59] [INFO] before\n"
        );
        assert_eq!(h.file("log_2024-06-02.txt"), "[00:00:01] [INFO] after\n");
        assert_eq!(
            h.coordinator.current_file(),
            Some(h.logs_dir.join("log_2024-06-02.txt"))
        );
    }

    #[test]
    fn test_open_line_carries_over_rotation() {
        let h = Harness::new(true, false);
        h.clock
            .set(Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 59).unwrap());
        h.coordinator
            .emit(Severity::Info, "working".into(), "...", false);
        h.clock.advance(Duration::seconds(2));
        h.coordinator.emit(Severity::Info, "done".into(), "\n", false);

        assert_eq!(h.file("log_2024-06-01.txt"), "[23:59:59] [INFO] working...");
        assert_eq!(h.file("log_2024-06-02.txt"), "done\n");
    }

    #[test]
    fn test_error_lines_force_fresh_file_lines() {
        let h = Harness::new(true, true);
        h.coordinator
            .emit(Severity::Info, "progress".into(), "", false);
        h.coordinator
            .emit_error_lines("thread 'main' panicked at src/main.rs:3:5:\nboom");

        assert_eq!(
            h.file("log_2024-06-01.txt"),
            "[12:00:00] [INFO] progress\n\
             [12:00:00] [ERROR] thread 'main' panicked at src/main.rs:3:5:\n\
             [12:00:00] [ERROR] boom\n"
        );
        // Console keeps its own open line untouched
        assert_eq!(h.console.contents(), "[12:00:00] [INFO] progress");
    }

    #[test]
    fn test_carriage_return_starts_new_file_entry() {
        let h = Harness::new(true, true);
        h.coordinator.emit(Severity::Normal, "10%".into(), "", false);
        h.coordinator
            .emit(Severity::Normal, "\r100%".into(), "\n", false);

        assert_eq!(
            h.console.contents(),
            "[12:00:00] [INFO] 10%\r[12:00:00] [INFO] 100%\n"
        );
        assert_eq!(
            h.file("log_2024-06-01.txt"),
            "[12:00:00] [INFO] 10%\n[12:00:00] [INFO] 100%\n"
        );
    }

    #[test]
    fn test_empty_write_changes_nothing() {
        let h = Harness::new(true, true);
        h.coordinator.emit(Severity::Info, String::new(), "", false);
        h.coordinator.emit(Severity::Info, "x".into(), "\n", false);
        assert_eq!(h.console.contents(), "[12:00:00] [INFO] x\n");
    }

    #[test]
    fn test_open_failure_degrades_once() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let logs_dir = blocker.join("logs");
        let config = Config {
            logs_dir: logs_dir.clone(),
            ..Config::default()
        };
        let h = Harness::with_config(temp_dir, logs_dir, &config, true, true);

        h.coordinator.emit(Severity::Info, "first".into(), "\n", false);
        h.coordinator.emit(Severity::Info, "second".into(), "\n", false);

        assert!(h.coordinator.file_degraded());
        let console = h.console.contents();
        assert_eq!(console.matches("File logging disabled").count(), 1);
        assert!(console.contains("[WARN] File logging disabled (failed to create logs directory"));
        assert!(console.ends_with("[12:00:00] [INFO] first\n[12:00:00] [INFO] second\n"));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_keeps_console() {
        let h = Harness::new(true, true);
        h.coordinator.emit(Severity::Info, "before".into(), "\n", false);
        h.coordinator.shutdown();
        h.coordinator.shutdown();
        h.coordinator.emit(Severity::Info, "after".into(), "\n", false);

        assert!(h.coordinator.is_shut_down());
        assert_eq!(h.file("log_2024-06-01.txt"), "[12:00:00] [INFO] before\n");
        assert!(h.console.contents().ends_with("[12:00:00] [INFO] after\n"));
    }

    #[test]
    fn test_concurrent_lines_are_never_torn() {
        let h = Harness::new(true, true);
        let threads = 8;
        let per_thread = 200;

        std::thread::scope(|scope| {
            for t in 0..threads {
                let coordinator = &h.coordinator;
                scope.spawn(move || {
                    for i in 0..per_thread {
                        coordinator.emit(Severity::Info, format!("t{t}-{i}"), "\n", false);
                    }
                });
            }
        });

        for output in [h.console.contents(), h.file("log_2024-06-01.txt")] {
            let mut seen = vec![Vec::new(); threads];
            for line in output.lines() {
                let body = line
                    .strip_prefix("[12:00:00] [INFO] t")
                    .unwrap_or_else(|| panic!("torn line: {line:?}"));
                let (t, i) = body.split_once('-').unwrap();
                seen[t.parse::<usize>().unwrap()].push(i.parse::<usize>().unwrap());
            }
            // Every line present, and each thread's lines in its own order
            for lines in seen {
                assert_eq!(lines, (0..per_thread).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_nested_emit_is_dropped() {
        let h = Harness::new(true, false);

        let outer = EmitGuard::enter().unwrap();
        assert!(in_emit());
        // Would deadlock on the mutex without the guard
        h.coordinator
            .emit(Severity::Info, "nested".into(), "\n", false);
        drop(outer);
        assert!(!in_emit());

        h.coordinator.emit(Severity::Info, "outer".into(), "\n", false);
        assert_eq!(h.file("log_2024-06-01.txt"), "[12:00:00] [INFO] outer\n");
    }

    /// Console that fails every write
    struct BrokenConsole;

    impl Write for BrokenConsole {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_console_failure_does_not_stop_file() {
        let temp_dir = TempDir::new().unwrap();
        let logs_dir = temp_dir.path().join("logs");
        let config = Config {
            logs_dir: logs_dir.clone(),
            ..Config::default()
        };
        let coordinator = WriteCoordinator::new(
            LineFormatter::new(SeverityTable::default(), "%H:%M:%S", false),
            Some(Box::new(BrokenConsole)),
            Some(RotationManager::new(&config).unwrap()),
            Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            )),
            TimeZoneSetting::Utc,
        );

        coordinator.emit(Severity::Error, "one".into(), "\n", true);
        coordinator.emit(Severity::Info, "two".into(), "\n", false);
        coordinator.flush();

        assert!(!coordinator.file_degraded());
        assert_eq!(
            fs::read_to_string(logs_dir.join("log_2024-06-01.txt")).unwrap(),
            "[12:00:00] [ERROR] one\n[12:00:00] [INFO] two\n"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_after_open_degrades_once() {
        // Opening /dev/full succeeds; every write to it fails with ENOSPC
        if !std::path::Path::new("/dev/full").exists() {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            logs_dir: PathBuf::from("/dev"),
            filename_fmt: "full".to_string(),
            file_buffering: 0,
            ..Config::default()
        };
        let h = Harness::with_config(temp_dir, PathBuf::from("/dev"), &config, true, true);

        h.coordinator
            .emit(Severity::Info, "partial".into(), "", false);
        h.coordinator.emit(Severity::Info, "first".into(), "\n", false);
        h.coordinator.emit(Severity::Info, "second".into(), "\n", false);

        assert!(h.coordinator.file_degraded());
        assert!(h.coordinator.current_file().is_none());
        let console = h.console.contents();
        assert_eq!(console.matches("File logging disabled").count(), 1);
        // The file is written first, so the notice precedes the line that failed
        assert!(console.starts_with(
            "[12:00:00] [WARN] File logging disabled (failed to write log file /dev/full"
        ));
        assert!(console.ends_with("[12:00:00] [INFO] partialfirst\n[12:00:00] [INFO] second\n"));
    }

    #[test]
    fn test_strict_encoding_drops_only_that_line() {
        let temp_dir = TempDir::new().unwrap();
        let logs_dir = temp_dir.path().join("logs");
        let config = Config {
            logs_dir: logs_dir.clone(),
            file_encoding: "ascii".to_string(),
            file_encoding_errors: "strict".to_string(),
            ..Config::default()
        };
        let h = Harness::with_config(temp_dir, logs_dir, &config, true, true);

        h.coordinator.emit(Severity::Info, "before".into(), "\n", false);
        h.coordinator.emit(Severity::Info, "café".into(), "\n", false);
        h.coordinator.emit(Severity::Info, "after".into(), "\n", false);

        assert!(!h.coordinator.file_degraded());
        assert_eq!(
            h.file("log_2024-06-01.txt"),
            "[12:00:00] [INFO] before\n[12:00:00] [INFO] after\n"
        );
        assert_eq!(
            h.console.contents(),
            "[12:00:00] [INFO] before\n[12:00:00] [INFO] café\n[12:00:00] [INFO] after\n"
        );
    }

    #[test]
    fn test_console_notice_closes_open_line_and_skips_file() {
        let h = Harness::new(true, true);
        h.coordinator
            .emit(Severity::Info, "working".into(), "...", false);
        h.coordinator
            .console_notice(Severity::Info, "Console colours disabled");
        h.coordinator.emit(Severity::Info, "done".into(), "\n", false);

        assert_eq!(
            h.console.contents(),
            "[12:00:00] [INFO] working...\n\
             [12:00:00] [INFO] Console colours disabled\n\
             [12:00:00] [INFO] done\n"
        );
        assert_eq!(h.file("log_2024-06-01.txt"), "[12:00:00] [INFO] working...done\n");
    }

    #[test]
    fn test_nested_emit_into_another_coordinator_is_dropped() {
        let outer = Harness::new(true, false);
        let inner = Harness::new(true, false);

        let guard = EmitGuard::enter().unwrap();
        inner
            .coordinator
            .emit(Severity::Info, "from a console writer".into(), "\n", false);
        drop(guard);
        outer.coordinator.emit(Severity::Info, "outer".into(), "\n", false);

        assert_eq!(inner.file("log_2024-06-01.txt"), "");
        assert_eq!(outer.file("log_2024-06-01.txt"), "[12:00:00] [INFO] outer\n");
    }
}
