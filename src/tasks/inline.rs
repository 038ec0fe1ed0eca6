use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;

use super::{DispatchError, Lane, Task, TaskHandler, TaskQueue, TaskTicket, report_outcome};

/// Runs each task to completion inside `enqueue`.
///
/// Task failures are reported the same way the worker pool reports them and
/// are not returned to the caller. A closed queue refuses every task.
pub struct InlineQueue {
    handler: Arc<dyn TaskHandler>,
    closed: AtomicBool,
}

impl InlineQueue {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            handler,
            closed: AtomicBool::new(false),
        }
    }

    /// Refuse all further work with [`DispatchError::QueueClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[async_trait]
impl TaskQueue for InlineQueue {
    async fn enqueue(&self, lane: Lane, task: Task) -> Result<TaskTicket, DispatchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::QueueClosed(lane));
        }

        let ticket = TaskTicket::new(lane, task.kind());
        let result = self.handler.handle(task).await;
        report_outcome(&ticket, &result);
        Ok(ticket)
    }
}
