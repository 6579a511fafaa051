//! Logging initialization.
//!
//! Hosts call `init_logging` once at startup and use `tracing` macros
//! everywhere else. Output goes to two sinks:
//! - structured JSONL appended to `~/.authgate/logs/gate.jsonl`
//! - compact human-readable lines on stderr
//!
//! The filter comes from `RUST_LOG` when set, otherwise from the level
//! passed in.

use crate::Paths;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level filter, overridable by `RUST_LOG`.
    pub default_level: String,
    /// JSONL file path. Defaults to `~/.authgate/logs/gate.jsonl`.
    pub log_path: Option<PathBuf>,
    /// Also emit logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize logging with the default sinks at `level`.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("Gate host started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_with(LogConfig {
        default_level: level.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_logging_with(config: LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let log_path = config
        .log_path
        .clone()
        .or_else(|| Paths::new().ok().map(|paths| paths.log_file()));

    let file_layer = log_path.and_then(|path| match open_log_file(&path) {
        Ok(file) => Some(
            fmt::layer()
                .json()
                .with_current_span(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("authgate: cannot open log file {}: {}", path.display(), e);
            None
        }
    });

    let stderr_layer = config.also_stderr.then(|| {
        fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
}

fn open_log_file(path: &PathBuf) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
