//! Logging for deskpulse
//!
//! Everything goes to a daily-rotated file under
//! `$XDG_STATE_HOME/deskpulse/`; stdout is reserved for command output.
//! `RUST_LOG` replaces the configured directives entirely.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "deskpulse.log";

/// Dependencies that are chatty at `debug` and below.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "rusqlite"];

/// Keeps the background log writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

impl LoggingConfig {
    /// Filter directives: the configured level for deskpulse, and no more
    /// than `info` for HTTP and SQLite internals.
    pub fn directives(&self) -> String {
        let level = self.level.trim().to_ascii_lowercase();
        let mut directives = vec![level.clone()];
        if matches!(level.as_str(), "debug" | "trace") {
            directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}=info")));
        }
        directives.join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(self.directives())
            .map_err(|e| Error::Config(format!("invalid logging.level '{}': {e}", self.level)))
    }
}

/// Install the global subscriber, writing under the XDG state directory.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    init_in(&Config::state_dir(), config)
}

/// Install the global subscriber, writing rotated files into `log_dir`.
pub fn init_in(log_dir: &Path, config: &LoggingConfig) -> Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {e}")))?;
    let (writer, worker) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        max_files = config.max_files,
        "Logging initialized"
    );
    Ok(LoggingGuard { _worker: worker })
}

/// Route log output through the test harness. Safe to call repeatedly.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Path of the current log file (before rotation suffixes).
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}
