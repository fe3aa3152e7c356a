//! Panic reporting.
//!
//! Release builds use `panic = "abort"`, which kills the process before the
//! non-blocking log writer flushes. The hook therefore writes the report to
//! the day's log file itself in that configuration.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::logging::LOG_FILE_PREFIX;

/// Chain a reporting hook in front of the current one.
pub fn install(log_dir: impl AsRef<Path>) {
    let log_dir: PathBuf = log_dir.as_ref().into();
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // A panic while reporting must not prevent the default hook.
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let report = describe(info);
            tracing::error!(target: "spybot::panic", "{}", report);
            if cfg!(panic = "abort")
                && let Err(e) = write_direct(&log_dir, &report)
            {
                eprintln!("failed to write panic report: {}", e);
            }
        }));
        default_hook(info);
    }));
}

fn write_direct(log_dir: &Path, report: &str) -> std::io::Result<()> {
    let path = log_dir.join(format!(
        "{}.{}",
        LOG_FILE_PREFIX,
        Local::now().format("%Y-%m-%d")
    ));
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", report)?;
    file.sync_all()
}

fn describe(info: &PanicHookInfo<'_>) -> String {
    let thread = std::thread::current();
    let location = info
        .location()
        .map_or_else(|| "unknown location".to_string(), |l| format!("{}:{}", l.file(), l.line()));

    format!(
        "{} panic in thread '{}' at {}: {}\n{}",
        Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
        thread.name().unwrap_or("unnamed"),
        location,
        payload_message(info.payload()),
        Backtrace::force_capture()
    )
}

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string payload"
    }
}
