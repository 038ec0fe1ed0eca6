//! Service wiring shared by the worker and the one-shot CLI commands.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    analytics::{
        AnalyticsRunner, AnalyticsTransport, DisabledTransport, EventFormatter, HttpTransport,
        TransportError,
    },
    config::{AnalyticsConfig, AppConfig},
    db::Database,
    retention::PageViewSweeper,
    tasks::{Task, TaskError, TaskHandler, TaskOutcome},
};

/// Everything a task worker needs to run tasks.
pub struct AppServices {
    pub database: Arc<Database>,
    analytics: AnalyticsRunner,
    sweeper: PageViewSweeper,
}

impl AppServices {
    pub fn new(
        config: &AppConfig,
        database: Arc<Database>,
        transport: Arc<dyn AnalyticsTransport>,
    ) -> Self {
        let analytics = AnalyticsRunner::new(EventFormatter::from_config(&config.analytics), transport);
        let sweeper = PageViewSweeper::new(database.page_views(), &config.retention);
        Self {
            database,
            analytics,
            sweeper,
        }
    }

    /// Build with the transport selected by configuration.
    pub fn from_config(config: &AppConfig, database: Arc<Database>) -> Result<Self, TransportError> {
        let transport = transport_from_config(&config.analytics)?;
        Ok(Self::new(config, database, transport))
    }

    pub fn sweeper(&self) -> &PageViewSweeper {
        &self.sweeper
    }
}

#[async_trait]
impl TaskHandler for AppServices {
    async fn handle(&self, task: Task) -> Result<TaskOutcome, TaskError> {
        match task {
            Task::Analytics(task) => {
                self.analytics.run(&task).await;
                Ok(TaskOutcome::Delivered)
            }
            Task::SweepPageViews => {
                let summary = self.sweeper.sweep_old_pageviews().await?;
                Ok(TaskOutcome::Swept(summary))
            }
        }
    }
}

/// HTTP delivery when analytics is enabled, otherwise a transport that drops
/// every hit.
pub fn transport_from_config(
    config: &AnalyticsConfig,
) -> Result<Arc<dyn AnalyticsTransport>, TransportError> {
    if !config.enabled {
        tracing::info!("Analytics delivery disabled by configuration");
        return Ok(Arc::new(DisabledTransport));
    }
    Ok(Arc::new(HttpTransport::from_config(config)?))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{Duration as Days, Utc};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, method},
    };

    use super::*;
    use crate::{
        analytics::{AnalyticsDispatcher, Extras, RecordingTransport},
        models::CreatePageView,
        tasks::{InlineQueue, Lane, TaskQueue, WorkerPool},
    };

    fn config_for(collector_url: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.analytics.tracking_id = "UA-12345-1".into();
        config.analytics.collector_url = collector_url.into();
        config
    }

    #[test]
    fn test_disabled_analytics_uses_disabled_transport() {
        let mut config = AnalyticsConfig::default();
        config.enabled = false;
        assert_eq!(transport_from_config(&config).unwrap().name(), "disabled");

        config.enabled = true;
        assert_eq!(transport_from_config(&config).unwrap().name(), "http");
    }

    #[tokio::test]
    async fn test_inline_pipeline_reaches_collector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("tid=UA-12345-1"))
            .and(body_string_contains("ec=download"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&format!("{}/collect", server.uri()));
        let services = AppServices::from_config(&config, Arc::new(Database::in_memory())).unwrap();
        let queue: Arc<dyn TaskQueue> = Arc::new(InlineQueue::new(Arc::new(services)));
        let dispatcher = AnalyticsDispatcher::from_config(queue, &config.analytics);

        dispatcher
            .send_event("download", "click", None, None, Extras::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_collector_failure_does_not_stop_worker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = config_for(&format!("{}/collect", server.uri()));
        let database = Arc::new(Database::in_memory());
        let services = Arc::new(AppServices::from_config(&config, database.clone()).unwrap());
        let pool = Arc::new(WorkerPool::start(&config.tasks, services));
        let dispatcher = AnalyticsDispatcher::from_config(pool.clone(), &config.analytics);

        for i in 0..3 {
            dispatcher
                .send_pageview(format!("https://docs.example.com/{i}"), None, Extras::new())
                .await
                .unwrap();
        }
        // The pool still accepts and runs work after failed deliveries
        let today = Utc::now().date_naive();
        database
            .page_views()
            .create(CreatePageView::new("pip", "latest", "/", today - Days::days(100)))
            .await
            .unwrap();
        pool.enqueue(Lane::Background, Task::SweepPageViews)
            .await
            .unwrap();

        assert!(pool.shutdown_with_timeout(Duration::from_secs(10)).await);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
        assert!(database.page_views().list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_task_reports_summary() {
        let config = AppConfig::default();
        let database = Arc::new(Database::in_memory());
        let today = Utc::now().date_naive();
        database
            .page_views()
            .create(CreatePageView::new("pip", "latest", "/", today - Days::days(91)))
            .await
            .unwrap();
        let services = AppServices::new(
            &config,
            database.clone(),
            Arc::new(RecordingTransport::new()),
        );

        let outcome = services.handle(Task::SweepPageViews).await.unwrap();
        match outcome {
            TaskOutcome::Swept(summary) => assert_eq!(summary.deleted, 1),
            other => panic!("expected sweep outcome, got {other:?}"),
        }
    }
}
