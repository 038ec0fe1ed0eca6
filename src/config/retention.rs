//! Page-view retention configuration.
//!
//! Configures the periodic sweep that deletes stored page views older than
//! the retention horizon.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! interval_hours = 24
//! pageview_days = 90
//! scan_window_days = 90
//! dry_run = false
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Page-view retention configuration.
///
/// When enabled, a sweep is scheduled every `interval_hours`. Each sweep
/// deletes records dated strictly before `today - pageview_days` and strictly
/// after that horizon minus `scan_window_days`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether retention sweeps are scheduled.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to schedule a sweep (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Days to keep page-view records.
    /// Default: 90 days
    #[serde(default = "default_pageview_days")]
    pub pageview_days: u32,

    /// Width of the slice below the horizon that one sweep may delete.
    /// Records older than the slice are left alone.
    /// Default: 90 days
    #[serde(default = "default_scan_window_days")]
    pub scan_window_days: u32,

    /// If true, count what would be deleted without deleting.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            pageview_days: default_pageview_days(),
            scan_window_days: default_scan_window_days(),
            dry_run: false,
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

fn default_pageview_days() -> u32 {
    90
}

fn default_scan_window_days() -> u32 {
    90
}

impl RetentionConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_hours == 0 {
            return Err(ConfigError::Validation(
                "retention.interval_hours must be at least 1".into(),
            ));
        }
        if self.scan_window_days == 0 {
            return Err(ConfigError::Validation(
                "retention.scan_window_days must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get the interval as a Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours * 3600)
    }
}
