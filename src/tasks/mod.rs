//! Background task queue.
//!
//! Units of work are enqueued on a named [`Lane`] and run off the caller's
//! path by a [`TaskHandler`]. Two queue implementations exist:
//!
//! - [`WorkerPool`]: bounded per-lane channels drained by Tokio workers
//! - [`InlineQueue`]: runs each task before `enqueue` returns (tests and CLI)
//!
//! Enqueue errors reach the caller. Once a task is accepted, its failures are
//! logged and counted on the worker and never travel back.

mod inline;
mod worker;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

pub use inline::InlineQueue;
pub use worker::WorkerPool;

use crate::{
    analytics::{AnalyticsTask, FormattingError},
    retention::{RetentionError, SweepSummary},
};

/// Worker lane a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Short tasks tied to user-facing requests.
    Web,
    /// Long-running maintenance.
    Background,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Web => "web",
            Lane::Background => "background",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work.
#[derive(Debug, Clone)]
pub enum Task {
    Analytics(AnalyticsTask),
    SweepPageViews,
}

impl Task {
    /// Task name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Analytics(task) => task.kind(),
            Task::SweepPageViews => "sweep_old_pageviews",
        }
    }
}

/// Receipt for an accepted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTicket {
    pub id: Uuid,
    pub lane: Lane,
    pub kind: &'static str,
}

impl TaskTicket {
    pub fn new(lane: Lane, kind: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            lane,
            kind,
        }
    }
}

/// Errors returned to the code that enqueues work.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0} lane is full")]
    QueueFull(Lane),

    #[error("{0} lane is not accepting work")]
    QueueClosed(Lane),

    #[error("Invalid analytics event: {0}")]
    InvalidEvent(#[from] FormattingError),
}

impl DispatchError {
    /// Short reason label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::QueueFull(_) => "full",
            DispatchError::QueueClosed(_) => "closed",
            DispatchError::InvalidEvent(_) => "invalid",
        }
    }
}

/// Errors raised while running an accepted task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Retention(#[from] RetentionError),

    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// What an accepted task produced.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// An analytics hit was handed to the transport.
    Delivered,
    /// A retention sweep finished.
    Swept(SweepSummary),
}

/// Executes tasks pulled from a queue.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task) -> Result<TaskOutcome, TaskError>;
}

/// Accepts work for asynchronous execution.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Offer `task` to `lane`. Does not wait for the task to run, except in
    /// synchronous test doubles.
    async fn enqueue(&self, lane: Lane, task: Task) -> Result<TaskTicket, DispatchError>;
}

/// Log the result of one task and record its completion metric.
pub(crate) fn report_outcome(ticket: &TaskTicket, result: &Result<TaskOutcome, TaskError>) {
    use crate::observability::metrics;

    match result {
        Ok(TaskOutcome::Delivered) => {
            tracing::debug!(task_id = %ticket.id, kind = ticket.kind, "Task complete");
        }
        Ok(TaskOutcome::Swept(summary)) => {
            tracing::debug!(
                task_id = %ticket.id,
                kind = ticket.kind,
                deleted = summary.deleted,
                "Task complete"
            );
        }
        Err(e) => {
            tracing::error!(task_id = %ticket.id, kind = ticket.kind, error = %e, "Task failed");
        }
    }
    metrics::record_task_completed(ticket.kind, result.is_ok());
}
