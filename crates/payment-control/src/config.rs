//! Orchestrator configuration loaded from environment variables.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Payment control configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `PAYMENT_CONTROL_MAX_ATTEMPTS`: passes allowed per attempt (default: `3`)
/// - `PAYMENT_CONTROL_MAX_RETRY_DELAY_MS`: upper bound on a retry delay (default: `300000`)
/// - `PAYMENT_CONTROL_PLUGINS`: comma-separated default plugin chain (default: empty)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub max_attempts: u32,
    pub max_retry_delay: Duration,
    pub default_plugin_names: Vec<String>,
    pub log_level: String,
}

impl ControlConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: lookup("PAYMENT_CONTROL_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            max_retry_delay: lookup("PAYMENT_CONTROL_MAX_RETRY_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_retry_delay),
            default_plugin_names: lookup("PAYMENT_CONTROL_PLUGINS")
                .map(|v| parse_plugin_names(&v))
                .unwrap_or(defaults.default_plugin_names),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Returns the retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            max_delay: self.max_retry_delay,
        }
    }
}

fn parse_plugin_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_retry_delay: Duration::from_secs(300),
            default_plugin_names: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}
