//! Logging configuration
//!
//! Describes where and how verbosely the binary logs. Installing the actual
//! subscriber is left to the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

/// Logging settings, usually loaded from the `[log]` table of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`, `off`
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,
    /// Log files kept in `log_dir`, newest first
    pub max_files: usize,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from("logs"),
            max_files: 10,
            file_prefix: "jacktime".to_string(),
        }
    }
}

impl LogConfig {
    /// Parse `level`, falling back to INFO
    pub fn parse_level(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            "off" => LevelFilter::OFF,
            _ => LevelFilter::INFO,
        }
    }

    pub fn ensure_log_directory(&self) -> io::Result<()> {
        if self.file_output {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }

    /// File name of this process's log, without the `.log` extension
    pub fn log_file_stem(&self) -> String {
        format!("{}-{}", self.file_prefix, std::process::id())
    }

    /// Log file for this process
    pub fn current_log_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.log_file_stem()))
    }

    /// Remove the oldest log files so that at most `max_files - 1` remain,
    /// leaving room for the current one. Returns the number removed.
    pub fn cleanup_old_logs(&self) -> io::Result<usize> {
        if !self.log_dir.is_dir() {
            return Ok(0);
        }

        let mut logs = Vec::new();
        for entry in fs::read_dir(&self.log_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&self.file_prefix) && name.ends_with(".log") {
                let modified = entry.metadata()?.modified()?;
                logs.push((modified, entry.path()));
            }
        }

        let keep = self.max_files.saturating_sub(1);
        if logs.len() <= keep {
            return Ok(0);
        }

        logs.sort_by(|a, b| b.0.cmp(&a.0));
        let mut removed = 0;
        for (_, path) in logs.into_iter().skip(keep) {
            fs::remove_file(path)?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        let mut config = LogConfig::default();
        assert_eq!(config.parse_level(), LevelFilter::INFO);
        config.level = "DEBUG".to_string();
        assert_eq!(config.parse_level(), LevelFilter::DEBUG);
        config.level = "nonsense".to_string();
        assert_eq!(config.parse_level(), LevelFilter::INFO);
    }

    #[test]
    fn test_cleanup_old_logs() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            log_dir: dir.path().to_path_buf(),
            max_files: 3,
            file_output: true,
            ..Default::default()
        };
        for i in 0..5 {
            fs::write(dir.path().join(format!("jacktime-{i}.log")), "x").unwrap();
        }
        fs::write(dir.path().join("other.txt"), "x").unwrap();

        assert_eq!(config.cleanup_old_logs().unwrap(), 3);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_current_log_path() {
        let config = LogConfig::default();
        let path = config.current_log_path();
        assert!(path.starts_with("logs"));
        assert!(path.to_string_lossy().ends_with(".log"));
        assert_eq!(
            path.file_stem().unwrap().to_string_lossy(),
            config.log_file_stem()
        );
    }
}
