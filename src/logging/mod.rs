//! Write pipeline for the print logger
//!
//! Formatting, daily rotation, retention, the serialized dual-destination writer and
//! panic capture.

mod capture;
mod clock;
mod coordinator;
mod encoding;
mod formatter;
mod record;
mod retention;
mod rotation;
mod severity;

pub use capture::{render_panic, PanicCapture};
pub use clock::{Clock, ManualClock, SystemClock, TimeZoneSetting};
pub use coordinator::{ConsoleWriter, Targets, WriteCoordinator};
pub use encoding::{EncodingErrors, FileBuffering, FileEncoding};
pub use formatter::{validate_strftime, LineFormatter, Rendered};
pub use record::{LogRecord, PrintOptions};
pub use retention::{RetentionSweeper, SweepReport};
pub use rotation::{render_filename, RotationManager, APP_PLACEHOLDER};
pub use severity::{Severity, SeverityStyle, SeverityTable, DEFAULT_RESET, RESET_KEY};
