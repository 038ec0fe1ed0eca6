use std::sync::Arc;

use super::{
    payload::{AnalyticsEvent, EventFormatter, Extras},
    transport::AnalyticsTransport,
};
use crate::{
    config::AnalyticsConfig,
    observability::metrics,
    tasks::{DispatchError, Lane, Task, TaskQueue, TaskTicket},
};

/// One analytics hit waiting to be formatted and delivered.
#[derive(Debug, Clone)]
pub struct AnalyticsTask {
    pub event: AnalyticsEvent,
    pub extras: Extras,
}

impl AnalyticsTask {
    pub fn new(event: AnalyticsEvent, extras: Extras) -> Self {
        Self { event, extras }
    }

    pub fn kind(&self) -> &'static str {
        match self.event {
            AnalyticsEvent::Pageview { .. } => "send_pageview",
            AnalyticsEvent::Event { .. } => "send_event",
        }
    }
}

/// Entry point for code that wants to record an analytics hit.
///
/// Hits are queued on the web lane and delivered later. The only errors
/// returned are admission failures and, when validation is on, hits missing a
/// required field.
pub struct AnalyticsDispatcher {
    queue: Arc<dyn TaskQueue>,
    formatter: EventFormatter,
    validate: bool,
}

impl AnalyticsDispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>, formatter: EventFormatter, validate: bool) -> Self {
        Self {
            queue,
            formatter,
            validate,
        }
    }

    pub fn from_config(queue: Arc<dyn TaskQueue>, config: &AnalyticsConfig) -> Self {
        Self::new(
            queue,
            EventFormatter::from_config(config),
            config.validate_events,
        )
    }

    /// Queue a pageview hit.
    pub async fn send_pageview(
        &self,
        url: impl Into<String>,
        title: Option<String>,
        extras: Extras,
    ) -> Result<TaskTicket, DispatchError> {
        self.dispatch(AnalyticsEvent::pageview(url, title), extras)
            .await
    }

    /// Queue a custom event hit.
    pub async fn send_event(
        &self,
        category: impl Into<String>,
        action: impl Into<String>,
        label: Option<String>,
        value: Option<i64>,
        extras: Extras,
    ) -> Result<TaskTicket, DispatchError> {
        self.dispatch(AnalyticsEvent::event(category, action, label, value), extras)
            .await
    }

    /// Queue an already-built event.
    pub async fn dispatch(
        &self,
        event: AnalyticsEvent,
        extras: Extras,
    ) -> Result<TaskTicket, DispatchError> {
        if self.validate
            && let Err(e) = self.formatter.format_checked(&event, &extras)
        {
            tracing::debug!(error = %e, "Rejected analytics hit");
            metrics::record_task_rejected(Lane::Web.as_str(), "invalid");
            return Err(DispatchError::InvalidEvent(e));
        }

        let task = Task::Analytics(AnalyticsTask::new(event, extras));
        self.queue.enqueue(Lane::Web, task).await
    }
}

/// Formats and delivers analytics tasks on a worker.
pub struct AnalyticsRunner {
    formatter: EventFormatter,
    transport: Arc<dyn AnalyticsTransport>,
}

impl AnalyticsRunner {
    pub fn new(formatter: EventFormatter, transport: Arc<dyn AnalyticsTransport>) -> Self {
        Self {
            formatter,
            transport,
        }
    }

    /// Format and send. Delivery problems are handled by the transport.
    pub async fn run(&self, task: &AnalyticsTask) {
        let payload = self.formatter.format(&task.event, &task.extras);
        tracing::debug!(
            kind = task.kind(),
            transport = self.transport.name(),
            "Sending analytics hit"
        );
        self.transport.send(&payload).await;
    }
}
