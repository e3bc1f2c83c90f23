//! Error definitions for the timing primitives

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a timing primitive or loading its configuration
///
/// Control operations (`start`, `stop`, `reset`, `toggle`, `cancel`) never fail;
/// invalid-but-harmless calls are no-ops. Everything in here is reported
/// synchronously to whoever tried to construct something.
#[derive(Debug, Error)]
pub enum TimingError {
    /// A period, duration, delay or tick interval of zero
    #[error("Invalid duration for {what}: must be greater than zero")]
    InvalidDuration { what: &'static str },

    /// Construction happened outside of a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// The configuration file exists but could not be read
    #[error("Failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::config::TimingConfig`]
    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl TimingError {
    pub(crate) fn ensure_positive(
        duration: std::time::Duration,
        what: &'static str,
    ) -> Result<std::time::Duration, TimingError> {
        if duration.is_zero() {
            Err(TimingError::InvalidDuration { what })
        } else {
            Ok(duration)
        }
    }

    pub(crate) fn current_runtime() -> Result<tokio::runtime::Handle, TimingError> {
        tokio::runtime::Handle::try_current().map_err(|e| TimingError::NoRuntime(e.to_string()))
    }
}
