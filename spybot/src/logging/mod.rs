//! Logging setup.
//!
//! Everything goes to stderr and to `spybot.log.YYYY-MM-DD` files that roll
//! over daily. Files older than [`RETENTION_DAYS`] are pruned once a day.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "spybot=info,spybot_sources=info,sqlx=warn";

pub const LOG_FILE_PREFIX: &str = "spybot.log";

pub const RETENTION_DAYS: u64 = 7;

const PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timestamps in the host's timezone with millisecond precision.
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must outlive
/// every log call.
pub fn init_logging(log_dir: &str) -> crate::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console = fmt::layer().with_timer(LocalTime).with_target(true);
    let file = fmt::layer()
        .with_timer(LocalTime)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| crate::Error::Other(format!("logging already initialized: {}", e)))?;

    Ok(guard)
}

/// Prune old log files now and then once a day until `token` is cancelled.
pub fn start_retention_cleanup(log_dir: impl Into<PathBuf>, token: CancellationToken) {
    let log_dir = log_dir.into();

    tokio::spawn(async move {
        loop {
            let dir = log_dir.clone();
            let today = Local::now().date_naive();
            match tokio::task::spawn_blocking(move || prune_logs(&dir, RETENTION_DAYS, today)).await
            {
                Ok(Ok(removed)) if !removed.is_empty() => {
                    info!("Removed {} expired log files", removed.len())
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Log pruning in {} failed: {}", log_dir.display(), e),
                Err(e) => warn!("Log pruning task failed: {}", e),
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(PRUNE_INTERVAL) => {}
            }
        }
        debug!("Log retention stopped");
    });
}

/// Delete `spybot.log.<date>` files dated more than `keep_days` before
/// `today`. Other files are never touched. Returns the removed paths.
pub fn prune_logs(dir: &Path, keep_days: u64, today: NaiveDate) -> io::Result<Vec<PathBuf>> {
    let Some(cutoff) = today.checked_sub_days(chrono::Days::new(keep_days)) else {
        return Ok(Vec::new());
    };

    let mut removed = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(date) = log_file_date(&path) else {
            continue;
        };
        if date >= cutoff || !path.is_file() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

fn log_file_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
