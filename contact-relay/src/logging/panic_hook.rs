//! Panic reporting.
//!
//! Notification channels run on detached tokio tasks, so a panic there never
//! reaches an HTTP response. The hook turns every panic into an `error!` event
//! with structured fields. Under `panic = "abort"` it also appends the record
//! to today's log file, since the non-blocking writer is not flushed on abort.

use std::backtrace::Backtrace;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};
use std::thread;

use chrono::{DateTime, Local};

use super::{LoggingConfig, daily_log_path};

/// What is known about one panic.
#[derive(Debug)]
pub struct PanicRecord {
    pub at: DateTime<Local>,
    pub thread: String,
    pub location: Option<String>,
    pub message: String,
    pub backtrace: String,
}

impl PanicRecord {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        Self {
            at: Local::now(),
            thread: thread::current().name().unwrap_or("<unnamed>").to_string(),
            location: info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column())),
            message: panic_message(info),
            backtrace: Backtrace::force_capture().to_string(),
        }
    }

    /// Append to the daily log file for the record's date.
    fn append_to(&self, log_dir: &Path) -> std::io::Result<PathBuf> {
        let path = daily_log_path(log_dir, self.at.date_naive());
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{self}")?;
        file.flush()?;
        Ok(path)
    }
}

impl fmt::Display for PanicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ERROR contact_relay::panic: v{} panicked thread={} location={} message={:?}",
            self.at.format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
            env!("CARGO_PKG_VERSION"),
            self.thread,
            self.location.as_deref().unwrap_or("<unknown>"),
            self.message,
        )?;
        write!(f, "{}", self.backtrace)
    }
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string panic payload>".to_string())
}

/// Install the hook, chaining to the one already set.
pub fn install(logging: &LoggingConfig) {
    let log_dir = logging.log_dir().to_path_buf();
    let previous = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let record = PanicRecord::capture(info);
            tracing::error!(
                target: "contact_relay::panic",
                thread = %record.thread,
                location = record.location.as_deref().unwrap_or("<unknown>"),
                message = %record.message,
                backtrace = %record.backtrace,
                "Panic"
            );

            if cfg!(panic = "abort") {
                let _ = record.append_to(&log_dir);
            }
        }));

        previous(info);
    }));
}
