//! Logging setup with console output and daily log files.
//!
//! - Console and file output share one `EnvFilter` (`RUST_LOG`, else the default)
//! - Files roll daily as `contact-relay.log.YYYY-MM-DD`
//! - Files older than 7 days are deleted by a background task
//! - Timestamps use the local timezone

use chrono::{Local, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

pub mod panic_hook;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "contact_relay=info,sqlx=warn,tower_http=info";

/// Prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "contact-relay.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Formats timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// What the installed subscriber was set up with.
pub struct LoggingConfig {
    filter: String,
    log_dir: PathBuf,
}

impl LoggingConfig {
    /// Filter directive in effect.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Get the log directory path.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Start the log retention cleanup task.
    ///
    /// Runs once at startup and then daily until `cancel_token` fires.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();

        tokio::spawn(async move {
            loop {
                if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
                    warn!(error = %e, "Failed to cleanup old logs");
                }

                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(CLEANUP_INTERVAL) => {}
                }
            }
        });
    }
}

/// Path of the daily file `tracing_appender::rolling::daily` writes for `date`.
pub fn daily_log_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("{}.{}", LOG_FILE_PREFIX, date.format("%Y-%m-%d")))
}

/// Date suffix of a rolled log file, if `filename` is one.
fn log_file_date(filename: &str) -> Option<NaiveDate> {
    let date_str = filename.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()
}

/// Delete log files older than `retention_days`. Returns how many were removed.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(log_file_date)
        else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

/// Initialize console and file logging.
///
/// Keep the returned guard alive for the app lifetime or buffered file
/// output is lost.
pub fn init_logging(log_dir: &Path) -> crate::Result<(Arc<LoggingConfig>, WorkerGuard)> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let directive = filter.to_string();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    let config = Arc::new(LoggingConfig {
        filter: directive,
        log_dir: log_dir.to_path_buf(),
    });

    Ok((config, guard))
}
