//! Structured logging setup.
//!
//! Component-target filtering mirrors the module tree:
//!
//! | Target | Description |
//! |--------|-------------|
//! | `riskgate::gatekeeper` | Gate decisions and rejections |
//! | `riskgate::dqs` | Data-quality scoring |
//! | `riskgate::drp` | Protocol state transitions |
//! | `riskgate::corr` | Correlation pipeline and publisher |
//! | `riskgate::heat` | Heat admissions |
//! | `riskgate::sizing` | Sizing solver |
//! | `riskgate::reservation` | Ledger, writer, sweeps |
//! | `riskgate::clock` | Snapshot registry |
//!
//! Hot-path logging stays at `debug!`/`trace!` behind non-blocking writers;
//! only EMERGENCY-grade transitions log synchronously at `error!`.
//!
//! ```bash
//! RUST_LOG=warn,riskgate::drp=debug cargo run
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable with colors (development default)
    #[default]
    Pretty,
    /// JSON lines for aggregation
    Json,
    /// Compact single-line
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Directory for rotated log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Write a rotated file stream in addition to stdout.
    #[serde(default)]
    pub enable_file: bool,
    /// Base filter when RUST_LOG is unset.
    #[serde(default = "default_filter")]
    pub default_filter: String,
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,
    #[serde(default)]
    pub stdout_format: LogFormat,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_filter() -> String {
    "info".to_string()
}

fn default_enable_stdout() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            enable_file: false,
            default_filter: default_filter(),
            enable_stdout: default_enable_stdout(),
            stdout_format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    /// Development preset: pretty stdout, no files.
    pub fn development() -> Self {
        Self::default()
    }

    /// Production preset: JSON stdout plus daily-rotated files.
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            enable_file: true,
            stdout_format: LogFormat::Json,
            ..Default::default()
        }
    }
}

/// Initialize the global subscriber.
///
/// The returned guards must stay alive for the process lifetime so the
/// non-blocking writers flush on shutdown.
pub fn init_logging(config: &LogConfig) -> Vec<WorkerGuard> {
    let mut guards = Vec::new();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    let file_layer = if config.enable_file {
        let appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "riskgate.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        Some(fmt::layer().with_writer(writer).with_ansi(false).json())
    } else {
        None
    };

    if config.enable_stdout {
        match config.stdout_format {
            LogFormat::Pretty => registry
                .with(file_layer)
                .with(fmt::layer().pretty())
                .init(),
            LogFormat::Json => registry.with(file_layer).with(fmt::layer().json()).init(),
            LogFormat::Compact => registry
                .with(file_layer)
                .with(fmt::layer().compact())
                .init(),
        }
    } else {
        registry.with(file_layer).init();
    }

    guards
}
