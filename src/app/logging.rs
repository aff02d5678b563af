use std::{fs::OpenOptions, path::Path, sync::Mutex};

use tracing_subscriber::EnvFilter;

use crate::app::error::ConfigError;

// Routes tracing output to a file, filtered by RUST_LOG (default: info)
pub fn init_logging(path: &Path) -> Result<(), ConfigError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ConfigError::LogFile {
            path: path.display().to_string(),
            source,
        })?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|err| ConfigError::Logging {
            message: err.to_string(),
        })
}
