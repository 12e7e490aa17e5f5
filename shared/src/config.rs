use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_COLLECTION: &str = "messages";
pub const DEFAULT_CACHE_KEY: &str = "messages";
pub const DEFAULT_MAX_TEXT_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Backoff for re-establishing a failed subscription while still connected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Zero leaves recovery to the next reconnect.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            jitter_max_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), excluding jitter.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms)
    }

    pub fn delay_with_jitter_ms(&self, attempt: u32) -> u64 {
        use rand::Rng;
        let jitter = if self.jitter_max_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_max_ms)
        };
        self.delay_ms(attempt).saturating_add(jitter)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote collection holding the message log.
    pub collection: String,
    pub cache_key: String,
    pub max_text_len: usize,
    pub retry: RetryPolicy,
    pub log_filter: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            retry: RetryPolicy::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("collection must not be empty".into()));
        }
        if self.cache_key.trim().is_empty() {
            return Err(ConfigError::Invalid("cache_key must not be empty".into()));
        }
        if self.max_text_len == 0 {
            return Err(ConfigError::Invalid("max_text_len must be > 0".into()));
        }
        if self.retry.base_backoff_ms == 0 {
            return Err(ConfigError::Invalid("retry.base_backoff_ms must be > 0".into()));
        }
        if self.retry.max_backoff_ms < self.retry.base_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.max_backoff_ms must be >= retry.base_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Missing file means defaults; a present but broken file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found; using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
