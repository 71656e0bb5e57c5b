use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV_VAR: &str = "TASKCAL_LOG";
pub const LOG_FILE_NAME: &str = "taskcal.log";
const DEFAULT_DIRECTIVE: &str = "info";

pub fn env_filter(fallback: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(fallback.unwrap_or(DEFAULT_DIRECTIVE)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// JSON lines into a daily-rolled `taskcal.log` under `logs_dir`, plus a
/// compact stderr layer. Keep the returned guard alive until exit or the
/// tail of the file log is lost.
pub fn init_logging(logs_dir: &Path, fallback: Option<&str>) -> Result<WorkerGuard, InfraError> {
    fs::create_dir_all(logs_dir)?;
    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter(fallback))
        .with(
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_current_span(false),
        )
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .map_err(|error| InfraError::InvalidConfig(format!("failed to install logger: {error}")))?;

    Ok(guard)
}
