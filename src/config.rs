use std::time::Duration;

// ============================================================================
// Engine Configuration
// ============================================================================
//
// Plain settings struct with a default, named presets and an environment
// loader. Only the lock timeout and the notification buffer are tunable.
//
// ============================================================================

pub const LOCK_TIMEOUT_ENV: &str = "ORDER_ENGINE_LOCK_TIMEOUT_MS";
pub const EVENT_CAPACITY_ENV: &str = "ORDER_ENGINE_EVENT_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a whole number, got {value:?}")]
    NotANumber { name: &'static str, value: String },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Default bound on waiting for an order's lock; `None` waits forever
    pub lock_timeout: Option<Duration>,
    /// Buffered envelopes per subscriber before it starts lagging
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Some(Duration::from_secs(5)),
            event_channel_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Short lock timeout for latency-critical callers
    pub fn strict() -> Self {
        Self {
            lock_timeout: Some(Duration::from_millis(250)),
            ..Self::default()
        }
    }

    /// Wait for locks indefinitely
    pub fn unbounded() -> Self {
        Self {
            lock_timeout: None,
            ..Self::default()
        }
    }

    /// Defaults overridden by `ORDER_ENGINE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(LOCK_TIMEOUT_ENV) {
            let millis = parse_number(LOCK_TIMEOUT_ENV, &raw)?;
            config.lock_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }

        if let Some(raw) = lookup(EVENT_CAPACITY_ENV) {
            let capacity = parse_number(EVENT_CAPACITY_ENV, &raw)?;
            if capacity == 0 {
                return Err(ConfigError::Zero { name: EVENT_CAPACITY_ENV });
            }
            config.event_channel_capacity = usize::try_from(capacity).map_err(|_| ConfigError::NotANumber {
                name: EVENT_CAPACITY_ENV,
                value: raw.clone(),
            })?;
        }

        tracing::debug!(
            lock_timeout = ?config.lock_timeout,
            event_channel_capacity = config.event_channel_capacity,
            "Engine configuration loaded"
        );

        Ok(config)
    }
}

fn parse_number(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::NotANumber {
        name,
        value: raw.to_string(),
    })
}
