//! Engine configuration.

use chrono::Duration;
use spotrate_common::{constants, RateType};

/// Configuration for the FX engine.
#[derive(Debug, Clone)]
pub struct FxEngineConfig {
    /// Freshness window used when a request does not give one.
    pub max_age_cache: Duration,
    /// Rate type used when a request does not give one.
    pub default_rate_type: RateType,
    /// Per-provider call timeout. `None` waits for the provider.
    pub provider_timeout: Option<std::time::Duration>,
}

impl Default for FxEngineConfig {
    fn default() -> Self {
        Self {
            max_age_cache: constants::default_max_age_cache(),
            default_rate_type: RateType::default(),
            provider_timeout: None,
        }
    }
}

impl FxEngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secs) = std::env::var("SPOTRATE_MAX_AGE_CACHE_SECS") {
            if let Some(max_age) = parse_max_age(&secs) {
                config.max_age_cache = max_age;
            }
        }

        if let Ok(rate_type) = std::env::var("SPOTRATE_DEFAULT_RATE_TYPE") {
            if !rate_type.is_empty() {
                config.default_rate_type = RateType::new(rate_type);
            }
        }

        if let Ok(ms) = std::env::var("SPOTRATE_PROVIDER_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.provider_timeout = Some(std::time::Duration::from_millis(ms));
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_age_cache < Duration::zero() {
            return Err("Cache max age cannot be negative".to_string());
        }

        if self.default_rate_type.as_str().is_empty() {
            return Err("Default rate type cannot be empty".to_string());
        }

        if self.provider_timeout == Some(std::time::Duration::ZERO) {
            return Err("Provider timeout cannot be zero".to_string());
        }

        Ok(())
    }
}

/// Seconds to a window; unparsable or out-of-range values are ignored.
fn parse_max_age(secs: &str) -> Option<Duration> {
    secs.trim().parse().ok().and_then(Duration::try_seconds)
}
