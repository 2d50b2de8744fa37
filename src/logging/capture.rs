//! Panic capture
//!
//! Chains onto the process panic hook: the previous hook renders the report exactly as
//! before, then the same report is written line by line to the log file at error
//! severity. Only one capture can be active per process.

use std::any::Any;
use std::backtrace::Backtrace;
use std::env;
use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread;

use super::coordinator::{in_emit, WriteCoordinator};

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static;

/// Set while a capture is installed anywhere in the process
static INSTALLED: Mutex<bool> = Mutex::new(false);

/// Handle to an installed capture; dropping it uninstalls the hook
pub struct PanicCapture {
    active: Arc<AtomicBool>,
    previous: Arc<PanicHook>,
}

impl PanicCapture {
    /// Chain a capturing hook in front of the current one
    ///
    /// Returns `None` if a capture is already installed, so a second logger never
    /// records the same panic twice.
    pub fn install(coordinator: Weak<WriteCoordinator>) -> Option<Self> {
        let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
        if *installed || thread::panicking() {
            return None;
        }

        let previous: Arc<PanicHook> = Arc::from(panic::take_hook());
        let active = Arc::new(AtomicBool::new(true));

        let hook_previous = Arc::clone(&previous);
        let hook_active = Arc::clone(&active);
        panic::set_hook(Box::new(move |info| {
            hook_previous(info);
            if !hook_active.load(Ordering::Acquire) || in_emit() {
                return;
            }
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.emit_error_lines(&render_panic(info));
            }
        }));

        *installed = true;
        tracing::debug!("panic capture installed");
        Some(Self { active, previous })
    }

    /// Whether this capture still records panics
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop capturing and hand the hook back to the previous one
    ///
    /// Safe to call repeatedly. While the thread is unwinding the hook cannot be
    /// replaced; the capture is only switched off and keeps forwarding.
    pub fn uninstall(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if !thread::panicking() {
            let previous = Arc::clone(&self.previous);
            drop(panic::take_hook());
            panic::set_hook(Box::new(move |info| previous(info)));
        }
        *INSTALLED.lock().unwrap_or_else(PoisonError::into_inner) = false;
        tracing::debug!("panic capture removed");
    }
}

impl Drop for PanicCapture {
    fn drop(&mut self) {
        self.uninstall();
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}

/// How much backtrace the default hook prints, from `RUST_BACKTRACE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BacktraceStyle {
    Off,
    Short,
    Full,
}

impl BacktraceStyle {
    fn from_env_value(value: Option<&str>) -> Self {
        match value {
            None | Some("0") => BacktraceStyle::Off,
            Some("full") => BacktraceStyle::Full,
            Some(_) => BacktraceStyle::Short,
        }
    }

    fn current() -> Self {
        Self::from_env_value(env::var("RUST_BACKTRACE").ok().as_deref())
    }
}

/// Cleared after the first report, like the default hook's one-time hint
static FIRST_REPORT: AtomicBool = AtomicBool::new(true);

const BACKTRACE_NOTE: &str =
    "note: run with `RUST_BACKTRACE=1` environment variable to display a backtrace";

/// Render a panic the way the default hook prints it
///
/// Follows `RUST_BACKTRACE` like the default hook. Captured frames are always printed
/// untrimmed, so a short backtrace here is longer than the one on stderr.
pub fn render_panic(info: &PanicHookInfo<'_>) -> String {
    let current = thread::current();
    let name = current.name().unwrap_or("<unnamed>");
    let location = info.location().map(ToString::to_string);

    let mut report = render_report(name, location.as_deref(), payload_message(info.payload()));
    match BacktraceStyle::current() {
        BacktraceStyle::Off => {
            if FIRST_REPORT.swap(false, Ordering::Relaxed) {
                report.push('\n');
                report.push_str(BACKTRACE_NOTE);
            }
        }
        BacktraceStyle::Short | BacktraceStyle::Full => {
            report.push_str("\nstack backtrace:\n");
            report.push_str(&Backtrace::force_capture().to_string());
        }
    }
    report
}

fn render_report(thread: &str, location: Option<&str>, message: &str) -> String {
    match location {
        Some(location) => format!("thread '{thread}' panicked at {location}:\n{message}"),
        None => format!("thread '{thread}' panicked:\n{message}"),
    }
}
