// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output always; with the `file-logging` feature and a `log_dir`,
//! also a timestamped run folder:
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       ├── rpu-device.log
//!       ├── rpu-update-engine.log
//!       └── rpu.log (combined)
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const RUN_PREFIX: &str = "run_";
const RUN_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Keeps file writers alive; logs are flushed when dropped
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder of this process, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Initialize the global subscriber
///
/// Fails if the level is unknown or a global subscriber is already set.
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    let level = config.level()?;
    let filter = debug_flags.to_filter_string(&level.to_string().to_lowercase());

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.format, &filter)];
    let guard = file_layers(config, &filter, &mut layers)?;

    Registry::default()
        .with(layers)
        .try_init()
        .context("Failed to install global tracing subscriber")?;

    tracing::debug!(target: "rpu_sim", "Logging initialized with filter '{}'", filter);
    Ok(guard)
}

/// Console-only logging at `info` with the given debug flags
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &LoggingConfig::default())
}

fn console_layer(format: LogFormat, filter: &str) -> BoxedLayer {
    match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .with_filter(EnvFilter::new(filter))
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(EnvFilter::new(filter))
            .boxed(),
    }
}

#[cfg(feature = "file-logging")]
fn file_layers(
    config: &LoggingConfig,
    filter: &str,
    layers: &mut Vec<BoxedLayer>,
) -> Result<LoggingGuard> {
    use tracing_appender::rolling;

    let Some(base_log_dir) = config.log_dir.as_ref() else {
        return Ok(LoggingGuard {
            _file_guards: Vec::new(),
            log_dir: None,
        });
    };

    let run_folder = base_log_dir.join(format!("{}{}", RUN_PREFIX, Utc::now().format(RUN_FORMAT)));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;
    cleanup_old_logs(base_log_dir, config.retention_days, config.retention_runs)?;

    let mut file_guards = Vec::new();
    for crate_name in crate::KNOWN_CRATES {
        let appender = rolling::daily(&run_folder, format!("{}.log", crate_name));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        file_guards.push(guard);

        let target = crate::tracing_target(crate_name);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(EnvFilter::new(format!("off,{}=debug", target)))
                .boxed(),
        );
    }

    let combined = rolling::daily(&run_folder, "rpu.log");
    let (combined_non_blocking, combined_guard) = tracing_appender::non_blocking(combined);
    file_guards.push(combined_guard);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(combined_non_blocking)
            .with_target(true)
            .json()
            .with_filter(EnvFilter::new(filter))
            .boxed(),
    );

    Ok(LoggingGuard {
        _file_guards: file_guards,
        log_dir: Some(run_folder),
    })
}

#[cfg(not(feature = "file-logging"))]
fn file_layers(
    config: &LoggingConfig,
    _filter: &str,
    _layers: &mut Vec<BoxedLayer>,
) -> Result<LoggingGuard> {
    if let Some(dir) = &config.log_dir {
        // subscriber is not installed yet
        eprintln!(
            "Warning: log_dir {} ignored (built without the file-logging feature)",
            dir.display()
        );
    }
    Ok(LoggingGuard { log_dir: None })
}

/// Timestamp of a `run_YYYYmmdd_HHMMSS` folder name
fn run_timestamp(dir_name: &str) -> Option<DateTime<Utc>> {
    let stamp = dir_name.strip_prefix(RUN_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, RUN_FORMAT).ok().map(|dt| dt.and_utc())
}

/// Remove run folders older than `retention_days`, then keep only the
/// `retention_runs` most recent ones
pub fn cleanup_old_logs(base_log_dir: &Path, retention_days: u64, retention_runs: usize) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);

    let mut runs: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(dt) = path.file_name().and_then(|n| n.to_str()).and_then(run_timestamp) {
            runs.push((path, dt));
        }
    }

    // newest first
    runs.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (index, (path, dt)) in runs.iter().enumerate() {
        if *dt < cutoff || index >= retention_runs {
            match std::fs::remove_dir_all(path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Warning: Failed to remove old log directory {}: {}", path.display(), e),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_timestamp() {
        let dt = run_timestamp("run_20250102_030405").unwrap();
        assert_eq!(dt.format(RUN_FORMAT).to_string(), "20250102_030405");
        assert!(run_timestamp("run_garbage").is_none());
        assert!(run_timestamp("20250102_030405").is_none());
    }

    #[test]
    fn test_cleanup_keeps_recent_runs() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        for minutes in 0..5 {
            let stamp = (now - chrono::Duration::minutes(minutes)).format(RUN_FORMAT);
            std::fs::create_dir(dir.path().join(format!("run_{}", stamp))).unwrap();
        }
        std::fs::create_dir(dir.path().join("not_a_run")).unwrap();

        let removed = cleanup_old_logs(dir.path(), 30, 3).unwrap();
        assert_eq!(removed, 2);

        let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 4);
        assert!(dir.path().join("not_a_run").exists());
    }

    #[test]
    fn test_cleanup_removes_expired_runs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("run_20000101_000000")).unwrap();
        let fresh = format!("run_{}", Utc::now().format(RUN_FORMAT));
        std::fs::create_dir(dir.path().join(&fresh)).unwrap();

        assert_eq!(cleanup_old_logs(dir.path(), 7, 10).unwrap(), 1);
        assert!(dir.path().join(fresh).exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(cleanup_old_logs(&dir.path().join("absent"), 1, 1).unwrap(), 0);
    }

    #[test]
    fn test_unknown_level_rejected_before_install() {
        let config = LoggingConfig {
            level: "shout".to_string(),
            ..Default::default()
        };
        assert!(init_logging(&CrateDebugFlags::default(), &config).is_err());
    }
}
