//! Tracing setup: stderr plus an optional daily-rolling log file.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the program.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

  let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

  let (file_layer, guard) = match &config.file {
    Some(path) => {
      let dir = path.parent().unwrap_or(std::path::Path::new("."));
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("offline-worker.log");

      let appender = tracing_appender::rolling::daily(dir, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer().with_ansi(false).with_writer(writer);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
