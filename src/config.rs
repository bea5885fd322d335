//! Engine configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Tunables for the decision engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a loaded config snapshot stays fresh before the next
    /// evaluation triggers a reload.
    pub cache_ttl: Duration,
    /// Trust score (0–100) assumed for sender domains with no history.
    pub default_sender_trust: f64,
    /// Below this many tracked emails a domain is flagged as a new sender.
    pub new_sender_threshold: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300), // 5 minutes
            default_sender_trust: 50.0,
            new_sender_threshold: 10,
        }
    }
}

impl EngineConfig {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// `FREIGHT_TRIAGE_CACHE_TTL_SECS` — snapshot TTL in seconds.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("FREIGHT_TRIAGE_CACHE_TTL_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FREIGHT_TRIAGE_CACHE_TTL_SECS".into(),
                message: format!("not a number: {raw}"),
            })?;
            config.cache_ttl = Duration::from_secs(secs);
        }
        Ok(config)
    }
}
