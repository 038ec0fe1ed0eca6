use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    DispatchError, Lane, Task, TaskError, TaskHandler, TaskQueue, TaskTicket, report_outcome,
};
use crate::{config::TasksConfig, observability::metrics};

struct Envelope {
    ticket: TaskTicket,
    task: Task,
}

/// Bounded per-lane queues drained by a fixed set of Tokio workers.
///
/// Each task runs in its own spawned future so a panic fails that task only.
/// Shutdown stops admission, lets workers drain what is already queued, and
/// is observed through [`WorkerPool::wait`].
pub struct WorkerPool {
    web: mpsc::Sender<Envelope>,
    background: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    rejected: AtomicU64,
}

impl WorkerPool {
    /// Spawn the workers. Must be called from within a Tokio runtime.
    pub fn start(config: &TasksConfig, handler: Arc<dyn TaskHandler>) -> Self {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let web = spawn_lane(
            Lane::Web,
            config.web_workers,
            config.queue_capacity,
            &handler,
            &cancel,
            &tracker,
        );
        let background = spawn_lane(
            Lane::Background,
            config.background_workers,
            config.queue_capacity,
            &handler,
            &cancel,
            &tracker,
        );

        tracing::info!(
            web_workers = config.web_workers,
            background_workers = config.background_workers,
            queue_capacity = config.queue_capacity,
            "Task worker pool started"
        );

        Self {
            web,
            background,
            cancel,
            tracker,
            rejected: AtomicU64::new(0),
        }
    }

    /// Token cancelled when the pool shuts down. Schedulers feeding the pool
    /// should stop on it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of tasks refused because a lane was full or closed.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Stop accepting work. Queued tasks still run.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
    }

    /// Wait for every worker to exit after [`WorkerPool::shutdown`].
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Shut down and wait up to `timeout`. Returns false if workers were
    /// still busy when the timeout elapsed.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> bool {
        self.shutdown();
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    fn sender(&self, lane: Lane) -> &mpsc::Sender<Envelope> {
        match lane {
            Lane::Web => &self.web,
            Lane::Background => &self.background,
        }
    }
}

#[async_trait]
impl TaskQueue for WorkerPool {
    async fn enqueue(&self, lane: Lane, task: Task) -> Result<TaskTicket, DispatchError> {
        let ticket = TaskTicket::new(lane, task.kind());

        if self.cancel.is_cancelled() {
            return Err(self.reject(DispatchError::QueueClosed(lane), &ticket));
        }

        let envelope = Envelope {
            ticket: ticket.clone(),
            task,
        };
        match self.sender(lane).try_send(envelope) {
            Ok(()) => {
                tracing::debug!(task_id = %ticket.id, lane = %lane, kind = ticket.kind, "Task enqueued");
                metrics::record_task_enqueued(lane.as_str(), ticket.kind);
                Ok(ticket)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(self.reject(DispatchError::QueueFull(lane), &ticket))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(self.reject(DispatchError::QueueClosed(lane), &ticket))
            }
        }
    }
}

impl WorkerPool {
    fn reject(&self, error: DispatchError, ticket: &TaskTicket) -> DispatchError {
        let count = self.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::record_task_rejected(ticket.lane.as_str(), error.reason());
        // Log periodically to avoid log spam (every 100 rejections)
        if count.is_multiple_of(100) {
            tracing::warn!(
                lane = %ticket.lane,
                kind = ticket.kind,
                rejected_count = count + 1,
                error = %error,
                "Task queue refused work"
            );
        }
        error
    }
}

fn spawn_lane(
    lane: Lane,
    workers: usize,
    capacity: usize,
    handler: &Arc<dyn TaskHandler>,
    cancel: &CancellationToken,
    tracker: &TaskTracker,
) -> mpsc::Sender<Envelope> {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let receiver = Arc::new(Mutex::new(receiver));

    for worker_id in 0..workers.max(1) {
        let receiver = Arc::clone(&receiver);
        let handler = Arc::clone(handler);
        let cancel = cancel.clone();
        tracker.spawn(run_worker(lane, worker_id, receiver, handler, cancel));
    }

    sender
}

async fn run_worker(
    lane: Lane,
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    handler: Arc<dyn TaskHandler>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                envelope = rx.recv() => envelope,
                _ = cancel.cancelled() => {
                    // Refuse new sends but hand out what is already buffered
                    rx.close();
                    rx.recv().await
                }
            }
        };

        let Some(Envelope { ticket, task }) = next else {
            break;
        };

        let task_handler = Arc::clone(&handler);
        let result = match tokio::spawn(async move { task_handler.handle(task).await }).await {
            Ok(result) => result,
            Err(join_error) => Err(TaskError::Panicked(join_error.to_string())),
        };
        report_outcome(&ticket, &result);
    }

    tracing::debug!(lane = %lane, worker_id, "Task worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::Notify;

    use super::*;
    use crate::{
        analytics::{AnalyticsEvent, AnalyticsTask},
        tasks::TaskOutcome,
    };

    fn pageview_task(url: &str) -> Task {
        Task::Analytics(AnalyticsTask::new(
            AnalyticsEvent::pageview(url, None),
            Default::default(),
        ))
    }

    fn config(workers: usize, capacity: usize) -> TasksConfig {
        TasksConfig {
            web_workers: workers,
            background_workers: 1,
            queue_capacity: capacity,
        }
    }

    /// Counts handled tasks; panics on URLs containing "panic".
    #[derive(Default)]
    struct CountingHandler {
        handled: AtomicUsize,
        done: Notify,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle(&self, task: Task) -> Result<TaskOutcome, TaskError> {
            if let Task::Analytics(t) = &task
                && let AnalyticsEvent::Pageview { url, .. } = &t.event
                && url.contains("panic")
            {
                panic!("handler exploded");
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            self.done.notify_one();
            Ok(TaskOutcome::Delivered)
        }
    }

    /// Blocks every task until released.
    struct GateHandler {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl TaskHandler for GateHandler {
        async fn handle(&self, _task: Task) -> Result<TaskOutcome, TaskError> {
            self.gate.notified().await;
            Ok(TaskOutcome::Delivered)
        }
    }

    async fn wait_for(handler: &CountingHandler, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.handled.load(Ordering::SeqCst) < n {
                handler.done.notified().await;
            }
        })
        .await
        .expect("tasks did not complete in time");
    }

    #[tokio::test]
    async fn test_enqueued_tasks_run() {
        let handler = Arc::new(CountingHandler::default());
        let pool = WorkerPool::start(&config(2, 10), handler.clone());

        for i in 0..5 {
            let ticket = pool
                .enqueue(Lane::Web, pageview_task(&format!("https://x/{i}")))
                .await
                .unwrap();
            assert_eq!(ticket.lane, Lane::Web);
            assert_eq!(ticket.kind, "send_pageview");
        }

        wait_for(&handler, 5).await;
        assert!(pool.shutdown_with_timeout(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_kill_worker() {
        let handler = Arc::new(CountingHandler::default());
        let pool = WorkerPool::start(&config(1, 10), handler.clone());

        pool.enqueue(Lane::Web, pageview_task("https://x/panic"))
            .await
            .unwrap();
        pool.enqueue(Lane::Web, pageview_task("https://x/ok"))
            .await
            .unwrap();

        wait_for(&handler, 1).await;
        assert!(pool.shutdown_with_timeout(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_full_lane_rejects() {
        let gate = Arc::new(Notify::new());
        let pool = WorkerPool::start(
            &config(1, 1),
            Arc::new(GateHandler {
                gate: Arc::clone(&gate),
            }),
        );

        // One task may be held by the worker and one more buffered; the lane
        // must refuse before ten are accepted.
        let mut full = None;
        for i in 0..10 {
            if let Err(e) = pool
                .enqueue(Lane::Web, pageview_task(&format!("https://x/{i}")))
                .await
            {
                full = Some(e);
                break;
            }
        }

        assert!(matches!(full, Some(DispatchError::QueueFull(Lane::Web))));
        assert!(pool.rejected_count() >= 1);

        // Other lane is unaffected
        assert!(pool.enqueue(Lane::Background, Task::SweepPageViews).await.is_ok());

        gate.notify_waiters();
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_closed() {
        let handler = Arc::new(CountingHandler::default());
        let pool = WorkerPool::start(&config(1, 10), handler);
        assert!(pool.shutdown_with_timeout(Duration::from_secs(5)).await);

        let err = pool
            .enqueue(Lane::Web, pageview_task("https://x/"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::QueueClosed(Lane::Web)));
        assert_eq!(err.reason(), "closed");
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_tasks() {
        let handler = Arc::new(CountingHandler::default());
        let pool = WorkerPool::start(&config(1, 10), handler.clone());

        for i in 0..3 {
            pool.enqueue(Lane::Web, pageview_task(&format!("https://x/{i}")))
                .await
                .unwrap();
        }
        assert!(pool.shutdown_with_timeout(Duration::from_secs(5)).await);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 3);
    }
}
