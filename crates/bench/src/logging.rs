//! Tracing subscriber setup.
//!
//! Two streams go to both stdout and the per-run log file:
//!
//! - the run log: timestamped, levelled events from every target
//! - the summary: bare lines on [`SUMMARY_TARGET`] (config echo, results,
//!   block histogram)

use memobench_types::RunId;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{filter_fn, ParseError},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// Target for un-decorated summary lines.
pub const SUMMARY_TARGET: &str = "memobench::summary";

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log file: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("Failed to initialize tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Keeps the file writer alive; drop it last to flush buffered lines.
pub struct LoggingGuard {
    _guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    /// Path of the run log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `memobench_<unix-ms>_<run-id>.log`.
pub fn log_file_name(run_id: &RunId, now: SystemTime) -> String {
    let millis = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("memobench_{}_{}.log", millis, run_id)
}

fn is_summary(meta: &tracing::Metadata<'_>) -> bool {
    meta.target() == SUMMARY_TARGET
}

/// Install the global subscriber, writing the run log into `dir`.
///
/// `RUST_LOG` overrides the default `info` level; summary lines are always
/// enabled.
pub fn init(run_id: &RunId, dir: &Path) -> Result<LoggingGuard, LoggingError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name(run_id, SystemTime::now()));
    let file = File::create(&path)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive(format!("{}=info", SUMMARY_TARGET).parse()?);

    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_filter(filter_fn(|meta| !is_summary(meta)));

    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(file_writer.clone())
        .with_ansi(false)
        .with_target(false)
        .with_filter(filter_fn(|meta| !is_summary(meta)));

    let stdout_summary = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_filter(filter_fn(is_summary));

    let file_summary = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_filter(filter_fn(is_summary));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_log)
        .with(file_log)
        .with(stdout_summary)
        .with(file_summary)
        .try_init()?;

    Ok(LoggingGuard {
        _guard: guard,
        path,
    })
}
