//! Tracing subscriber setup.

use remoteplay_shared::errors::{RemoteplayError, RemoteplayResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_FILE_PREFIX: &str = "remoteplay.log";

/// Build the filter. `RUST_LOG` wins over `level`.
fn env_filter(level: &str) -> RemoteplayResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| RemoteplayError::Config(format!("invalid log level '{}': {}", level, e))),
    }
}

/// Install the global subscriber.
///
/// Logs go to stderr. With `log_dir`, a daily rolling file is written too and
/// the returned guard must be held until exit so buffered lines get flushed.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> RemoteplayResult<Option<WorkerGuard>> {
    let filter = env_filter(level)?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| RemoteplayError::Internal(format!("failed to initialize logging: {}", e)))?;

    Ok(guard)
}
