//! Prometheus metrics for the analytics worker.
//!
//! Provides metrics for:
//! - Task admission and completion per lane
//! - Analytics delivery outcomes
//! - Retention deletions and failures
//!
//! Every recording function is callable without the `prometheus` feature and
//! compiles to a no-op in that case.

#[cfg(feature = "prometheus")]
use metrics::counter;

use crate::config::MetricsConfig;

/// Initialize the metrics system with the given configuration.
///
/// Installs the Prometheus recorder and its scrape listener. Must be called
/// from within a Tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let addr: std::net::SocketAddr = config
        .listen
        .parse()
        .map_err(|e| MetricsError::Setup(format!("invalid metrics listen address: {e}")))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    tracing::info!(listen = %addr, "Prometheus metrics listener started");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record a task accepted onto a lane.
pub fn record_task_enqueued(lane: &str, kind: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "tasks_enqueued_total",
            "lane" => lane.to_string(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (lane, kind);
    }
}

/// Record a task the queue refused to accept.
///
/// # Arguments
/// * `lane` - The lane the task was offered to
/// * `reason` - Why it was refused (`full`, `closed`, `invalid`)
pub fn record_task_rejected(lane: &str, reason: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "tasks_rejected_total",
            "lane" => lane.to_string(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (lane, reason);
    }
}

/// Record a unit of work finishing on a worker.
pub fn record_task_completed(kind: &str, success: bool) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "tasks_completed_total",
            "kind" => kind.to_string(),
            "status" => if success { "success" } else { "error" }
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (kind, success);
    }
}

/// Record one delivery attempt to the analytics collector.
///
/// # Arguments
/// * `hit_type` - `pageview` or `event`
/// * `outcome` - `delivered`, `rejected`, `failed` or `disabled`
pub fn record_analytics_delivery(hit_type: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "analytics_deliveries_total",
            "hit_type" => hit_type.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (hit_type, outcome);
    }
}

/// Record data retention deletion.
///
/// # Arguments
/// * `table` - The table from which records were deleted
/// * `count` - The number of records deleted
pub fn record_retention_deletion(table: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_deletions_total",
            "table" => table.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (table, count);
    }
}

/// Record a failed retention run.
pub fn record_retention_error(job: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_errors_total",
            "job" => job.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = job;
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_metrics_is_noop() {
        let config = MetricsConfig::default();
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        record_task_enqueued("web", "send_pageview");
        record_task_rejected("web", "full");
        record_task_completed("sweep_old_pageviews", false);
        record_analytics_delivery("event", "failed");
        record_retention_deletion("page_views", 3);
        record_retention_error("page_views");
    }
}
