//! Analytics collector configuration.
//!
//! # Example
//!
//! ```toml
//! [analytics]
//! enabled = true
//! tracking_id = "UA-12345-1"
//! collector_url = "https://www.google-analytics.com/collect"
//! app_name = "Read the Docs"
//! timeout_secs = 3
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Analytics configuration.
///
/// Supplies the collector endpoint plus the site identifier and application
/// name/version that are merged into every event as default parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Whether events are delivered at all.
    /// When false, dispatch still succeeds but the transport drops payloads.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Site/tracking identifier sent as `tid`.
    #[serde(default)]
    pub tracking_id: String,

    /// Collector endpoint receiving form-encoded payloads.
    #[serde(default = "default_collector_url")]
    pub collector_url: String,

    /// Application name sent as `an`.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application version sent as `av`.
    /// Default: the version of this crate
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Timeout for a single delivery attempt.
    /// Default: 3 seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Reject events whose required fields are missing or blank at dispatch time.
    /// Default: true
    #[serde(default = "default_true")]
    pub validate_events: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tracking_id: String::new(),
            collector_url: default_collector_url(),
            app_name: default_app_name(),
            app_version: default_app_version(),
            timeout_secs: default_timeout_secs(),
            validate_events: true,
        }
    }
}

impl AnalyticsConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.collector_url).map_err(|e| {
            ConfigError::Validation(format!(
                "analytics.collector_url '{}' is not a valid URL: {}",
                self.collector_url, e
            ))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "analytics.collector_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "analytics.timeout_secs must be at least 1".into(),
            ));
        }

        if self.enabled && self.tracking_id.is_empty() {
            tracing::warn!("Analytics is enabled but analytics.tracking_id is empty");
        }

        Ok(())
    }

    /// Get the delivery timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_collector_url() -> String {
    "https://www.google-analytics.com/collect".to_string()
}

fn default_app_name() -> String {
    "Read the Docs".to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_timeout_secs() -> u64 {
    3
}
