//! Logging bootstrap for the binary.
//!
//! Output goes to stdout and to a log file. The level comes from `LOG_LEVEL`,
//! then the config's `logging.level`, then the environment default (`debug`
//! in development, `info` otherwise). The file path resolves the same way
//! through `LOG_FILE` and `logging.file`.

use crate::infrastructure::settings::{Environment, LoggingSettings};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Resolved logging options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub level: String,
    pub file: PathBuf,
}

impl LogOptions {
    pub fn resolve(env: &Environment, config: Option<&LoggingSettings>) -> Self {
        let dev = env.is_development();
        let fallback = if dev { "debug" } else { "info" };

        let requested = env
            .log_level
            .clone()
            .or_else(|| config.and_then(|c| c.level.clone()))
            .map(|level| level.to_ascii_lowercase());
        let level = match requested {
            Some(level) if LEVELS.contains(&level.as_str()) => level,
            _ => fallback.to_string(),
        };

        let file = env
            .log_file
            .clone()
            .or_else(|| config.and_then(|c| c.file.clone()))
            .unwrap_or_else(|| {
                if dev {
                    "logs/dev.log".to_string()
                } else {
                    "logs/app.log".to_string()
                }
            });

        Self {
            level,
            file: PathBuf::from(file),
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard must be held for the life of the process, or buffered
/// file output is lost on exit.
pub fn init(options: &LogOptions) -> std::io::Result<WorkerGuard> {
    let directory = options
        .file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(directory)?;
    let file_name = options
        .file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "app.log".into());

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer().with_target(false);
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.level.as_str()));

    if let Err(err) = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("tracing already initialized: {}", err);
    }

    Ok(guard)
}
