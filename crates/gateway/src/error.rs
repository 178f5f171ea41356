//! Gateway error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Gateway errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The config file is unreadable or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The `check` command found a problem.
    #[error("check failed: {0}")]
    CheckFailed(String),

    /// An I/O error occurred, e.g. binding the listener.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
