//! File logging.
//!
//! The terminal belongs to the running program, so logs go to a file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;
use crate::error::{Error, Result};

fn file_subscriber(path: &Path, debug: bool) -> Result<impl tracing::Subscriber + Send + Sync> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| Error::Logging(format!("{}: {err}", path.display())))?;
    let filter = EnvFilter::new(if debug { "debug" } else { "info" });
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .finish())
}

/// Install a global subscriber appending to `path`. Fails if a global
/// subscriber is already set.
pub fn log_to_file(path: impl AsRef<Path>, debug: bool) -> Result<()> {
    let subscriber = file_subscriber(path.as_ref(), debug)?;
    tracing::subscriber::set_global_default(subscriber).map_err(|err| Error::Logging(err.to_string()))
}

/// [`log_to_file`] with the path and level from `config`. Returns whether
/// logging was enabled.
pub fn init_from_env(config: &EnvConfig) -> Result<bool> {
    match &config.log_file {
        Some(path) => log_to_file(path, config.debug).map(|()| true),
        None => Ok(false),
    }
}
