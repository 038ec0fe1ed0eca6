//! Page-view retention sweeps.
//!
//! [`PageViewSweeper`] does one sweep. [`start_retention_scheduler`] enqueues
//! a sweep on the background lane at the configured interval; the sweep
//! itself runs on a task worker.

use std::{sync::Arc, time::Duration};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::RetentionWindow;
use crate::{
    config::RetentionConfig,
    db::{DbError, PageViewRepo},
    observability::metrics,
    tasks::{Lane, Task, TaskQueue},
};

const TABLE: &str = "page_views";

/// Results from a single sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub window: RetentionWindow,
    /// Records deleted, or that would be deleted in a dry run.
    pub deleted: u64,
    /// IDs removed by this sweep. Empty in a dry run.
    pub deleted_ids: Vec<Uuid>,
    pub dry_run: bool,
}

impl SweepSummary {
    /// Check if any records were deleted.
    pub fn has_deletions(&self) -> bool {
        self.deleted > 0
    }
}

/// A failed sweep. The next scheduled sweep is the retry.
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("Page-view sweep failed: {0}")]
    Storage(#[from] DbError),
}

/// Deletes page views that fall inside the current [`RetentionWindow`].
pub struct PageViewSweeper {
    repo: Arc<dyn PageViewRepo>,
    retention_days: u32,
    scan_window_days: u32,
    dry_run: bool,
}

impl PageViewSweeper {
    pub fn new(repo: Arc<dyn PageViewRepo>, config: &RetentionConfig) -> Self {
        Self {
            repo,
            retention_days: config.pageview_days,
            scan_window_days: config.scan_window_days,
            dry_run: config.dry_run,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sweep relative to today's UTC date.
    pub async fn sweep_old_pageviews(&self) -> Result<SweepSummary, RetentionError> {
        self.sweep_on(Utc::now().date_naive()).await
    }

    /// Sweep as if today were `today`.
    pub async fn sweep_on(&self, today: NaiveDate) -> Result<SweepSummary, RetentionError> {
        let window = RetentionWindow::compute(today, self.retention_days, self.scan_window_days);

        let result = self.sweep_window(window).await;
        match &result {
            Ok(summary) if summary.dry_run => {
                tracing::info!(
                    horizon = %window.horizon,
                    floor = %window.floor,
                    would_delete = summary.deleted,
                    "DRY RUN: Page-view sweep complete"
                );
            }
            Ok(summary) if summary.has_deletions() => {
                tracing::info!(
                    horizon = %window.horizon,
                    floor = %window.floor,
                    deleted = summary.deleted,
                    "Page-view sweep complete"
                );
            }
            Ok(_) => {
                tracing::debug!(horizon = %window.horizon, "Page-view sweep complete, nothing to delete");
            }
            Err(e) => {
                tracing::error!(error = %e, horizon = %window.horizon, "Page-view sweep failed");
                metrics::record_retention_error(TABLE);
            }
        }
        result
    }

    async fn sweep_window(&self, window: RetentionWindow) -> Result<SweepSummary, RetentionError> {
        if self.dry_run {
            let count = self
                .repo
                .count_between(window.floor, window.horizon)
                .await?;
            return Ok(SweepSummary {
                window,
                deleted: count,
                deleted_ids: Vec::new(),
                dry_run: true,
            });
        }

        let deleted_ids = self
            .repo
            .delete_between(window.floor, window.horizon)
            .await?;
        let deleted = deleted_ids.len() as u64;
        if deleted > 0 {
            metrics::record_retention_deletion(TABLE, deleted);
        }

        Ok(SweepSummary {
            window,
            deleted,
            deleted_ids,
            dry_run: false,
        })
    }
}

/// Starts the retention scheduler as a background task.
///
/// Enqueues one sweep immediately and then every `interval_hours` until
/// `cancel` fires. A refused enqueue is logged and retried on the next tick.
pub async fn start_retention_scheduler(
    queue: Arc<dyn TaskQueue>,
    config: RetentionConfig,
    cancel: CancellationToken,
) {
    if !config.enabled {
        tracing::info!("Retention scheduler disabled by configuration");
        return;
    }

    let dry_run_msg = if config.dry_run { " (DRY RUN)" } else { "" };
    tracing::info!(
        interval_hours = config.interval_hours,
        pageview_days = config.pageview_days,
        scan_window_days = config.scan_window_days,
        dry_run = config.dry_run,
        "Starting retention scheduler{}",
        dry_run_msg
    );

    schedule_sweeps(queue, config.interval(), cancel).await;
}

async fn schedule_sweeps(queue: Arc<dyn TaskQueue>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention scheduler shutting down");
                break;
            }
            _ = ticker.tick() => {
                match queue.enqueue(Lane::Background, Task::SweepPageViews).await {
                    Ok(ticket) => {
                        tracing::debug!(task_id = %ticket.id, "Scheduled page-view sweep");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not schedule page-view sweep");
                    }
                }
            }
        }
    }
}
