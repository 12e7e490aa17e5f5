//! Log setup for shells that don't install their own subscriber.
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::SyncConfig;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Installs a fmt subscriber filtered by `filter` (`RUST_LOG` syntax).
pub fn init(filter: &str) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(filter).map_err(|e| TelemetryError::InvalidFilter {
        filter: filter.to_string(),
        reason: e.to_string(),
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInitialized)
}

/// Installs the subscriber using [`SyncConfig::log_filter`].
pub fn init_from(config: &SyncConfig) -> Result<(), TelemetryError> {
    init(&config.log_filter)
}
