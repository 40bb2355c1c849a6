//! Tracing subscriber for a jacktime session
//!
//! Console output goes to stderr. The optional log file is written through a
//! non-blocking appender so that the reporter thread never waits on disk.

use anyhow::{Context, Result};
use jacktime_core::{JacktimeConfig, LogConfig};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Flushes the log file when dropped
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Install the global subscriber and log the session identity
pub fn init(config: &JacktimeConfig) -> Result<Option<LogGuard>> {
    let log = &config.log;

    let console_layer = log.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(level_filter(log))
    });

    let mut removed = 0;
    let (file_layer, guard) = if log.file_output {
        let (writer, worker, stale) = file_writer(log)?;
        removed = stale;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_names(true)
            .with_filter(level_filter(log));
        (Some(layer), Some(LogGuard { _worker: worker }))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("A tracing subscriber is already installed")?;

    info!(
        role = ?config.role,
        backend = ?config.backend,
        client = %config.client_name(),
        level = %log.parse_level(),
        "jacktime session started"
    );
    if log.file_output {
        info!(path = %log.current_log_path().display(), "Writing log file");
        if removed > 0 {
            info!("Removed {} old log file(s)", removed);
        }
    }
    Ok(guard)
}

/// `RUST_LOG` wins over the configured level
fn level_filter(log: &LogConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(log.parse_level().into())
        .from_env_lossy()
}

/// Non-blocking writer for this process's log file, after pruning old files
fn file_writer(log: &LogConfig) -> Result<(NonBlocking, WorkerGuard, usize)> {
    log.ensure_log_directory()
        .with_context(|| format!("Failed to create log directory {}", log.log_dir.display()))?;
    let removed = log.cleanup_old_logs().unwrap_or_else(|e| {
        eprintln!("Warning: failed to remove old log files: {e}");
        0
    });

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(log.log_file_stem())
        .filename_suffix("log")
        .build(&log.log_dir)
        .with_context(|| format!("Failed to open {}", log.current_log_path().display()))?;
    let (writer, worker) = tracing_appender::non_blocking(appender);
    Ok((writer, worker, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_writer_creates_current_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogConfig {
            file_output: true,
            log_dir: dir.path().join("nested"),
            max_files: 2,
            ..Default::default()
        };

        let (mut writer, worker, removed) = file_writer(&log).unwrap();
        assert_eq!(removed, 0);
        writer.write_all(b"beat 2 at frame 24000\n").unwrap();
        drop(writer);
        drop(worker);

        let written = std::fs::read_to_string(log.current_log_path()).unwrap();
        assert_eq!(written, "beat 2 at frame 24000\n");
    }

    #[test]
    fn test_file_writer_prunes_old_logs() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            std::fs::write(dir.path().join(format!("jacktime-old{i}.log")), "x").unwrap();
        }
        let log = LogConfig {
            file_output: true,
            log_dir: dir.path().to_path_buf(),
            max_files: 2,
            ..Default::default()
        };

        let (_writer, _worker, removed) = file_writer(&log).unwrap();
        assert_eq!(removed, 2);
    }
}
