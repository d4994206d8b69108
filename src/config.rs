//! Engine configuration.
//!
//! Carries the backend connection settings and the polling policy. Hosts
//! either build a [`PaymentsConfig`] directly or load one from the
//! environment with [`PaymentsConfig::from_env`].

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Default cadence for intent status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Default timeout for backend API requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds for a configured poll interval. Anything faster hammers the
/// provider; anything slower makes the checkout feel dead.
const POLL_INTERVAL_MS_MIN: u64 = 500;
const POLL_INTERVAL_MS_MAX: u64 = 60_000;

const ENV_API_URL: &str = "BACKOFFICE_API_URL";
const ENV_API_KEY: &str = "BACKOFFICE_API_KEY";
const ENV_POLL_INTERVAL_MS: &str = "QR_POLL_INTERVAL_MS";
const ENV_ENFORCE_EXPIRY: &str = "QR_ENFORCE_EXPIRY";

/// Configuration for the payments engine.
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    /// Base URL of the dashboard backend, e.g. `https://admin.thesmall.app`.
    pub base_url: String,
    /// API key sent on every request.
    pub api_key: String,
    /// Cadence of intent status checks.
    pub poll_interval: Duration,
    /// Timeout for individual backend requests.
    pub request_timeout: Duration,
    /// Stop polling once the provider-supplied expiry has passed and park
    /// the flow in `expired`. Off by default: expiry is advisory display
    /// information and the remote intent lapses on its own.
    pub enforce_expiry: bool,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            enforce_expiry: false,
        }
    }
}

impl PaymentsConfig {
    /// Build a config with the given connection settings and default policy.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Load configuration from the environment.
    ///
    /// `BACKOFFICE_API_URL` and `BACKOFFICE_API_KEY` are required;
    /// `QR_POLL_INTERVAL_MS` (clamped to 500..=60000) and
    /// `QR_ENFORCE_EXPIRY` (`1`/`true`) are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = require_var(ENV_API_URL)?;
        let api_key = require_var(ENV_API_KEY)?;

        let mut config = Self::new(base_url, api_key);

        if let Ok(raw) = env::var(ENV_POLL_INTERVAL_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidVar {
                    var: ENV_POLL_INTERVAL_MS,
                    value: raw.clone(),
                })?;
            config.poll_interval =
                Duration::from_millis(ms.clamp(POLL_INTERVAL_MS_MIN, POLL_INTERVAL_MS_MAX));
        }

        if let Ok(raw) = env::var(ENV_ENFORCE_EXPIRY) {
            config.enforce_expiry = matches!(raw.trim(), "1" | "true" | "TRUE" | "True");
        }

        Ok(config)
    }
}

fn require_var(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            ENV_API_URL,
            ENV_API_KEY,
            ENV_POLL_INTERVAL_MS,
            ENV_ENFORCE_EXPIRY,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = PaymentsConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(3000));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!config.enforce_expiry);
    }

    #[test]
    #[serial]
    fn test_from_env_requires_url_and_key() {
        clear_env();
        assert!(matches!(
            PaymentsConfig::from_env(),
            Err(ConfigError::MissingVar(ENV_API_URL))
        ));

        std::env::set_var(ENV_API_URL, "https://admin.thesmall.app");
        assert!(matches!(
            PaymentsConfig::from_env(),
            Err(ConfigError::MissingVar(ENV_API_KEY))
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_full() {
        clear_env();
        std::env::set_var(ENV_API_URL, "https://admin.thesmall.app");
        std::env::set_var(ENV_API_KEY, "pos-key-123");
        std::env::set_var(ENV_POLL_INTERVAL_MS, "5000");
        std::env::set_var(ENV_ENFORCE_EXPIRY, "true");

        let config = PaymentsConfig::from_env().expect("from_env");
        assert_eq!(config.base_url, "https://admin.thesmall.app");
        assert_eq!(config.api_key, "pos-key-123");
        assert_eq!(config.poll_interval, Duration::from_millis(5000));
        assert!(config.enforce_expiry);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_clamps_interval() {
        clear_env();
        std::env::set_var(ENV_API_URL, "https://admin.thesmall.app");
        std::env::set_var(ENV_API_KEY, "pos-key-123");
        std::env::set_var(ENV_POLL_INTERVAL_MS, "10");

        let config = PaymentsConfig::from_env().expect("from_env");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage_interval() {
        clear_env();
        std::env::set_var(ENV_API_URL, "https://admin.thesmall.app");
        std::env::set_var(ENV_API_KEY, "pos-key-123");
        std::env::set_var(ENV_POLL_INTERVAL_MS, "soon");

        assert!(matches!(
            PaymentsConfig::from_env(),
            Err(ConfigError::InvalidVar { .. })
        ));
        clear_env();
    }
}
