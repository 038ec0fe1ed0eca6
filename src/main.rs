use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use docs_analytics::{
    AppConfig, AppServices,
    analytics::{AnalyticsDispatcher, AnalyticsEvent, Extras, ParamValue},
    db::Database,
    observability::{self, metrics},
    retention::{PageViewSweeper, start_retention_scheduler},
    tasks::{InlineQueue, TaskQueue, WorkerPool},
};

/// Config file looked up in the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "docs-analytics.toml";

/// How long shutdown waits for queued tasks to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// CLI arguments for the analytics worker
#[derive(Parser, Debug)]
#[command(version, about = "Documentation analytics worker", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./docs-analytics.toml if it exists,
    /// otherwise built-in defaults are used)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the task workers and the retention scheduler (default)
    Worker,
    /// Run one page-view retention sweep now and print the summary as JSON
    Sweep {
        /// Count matching records without deleting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Send a pageview hit and wait for delivery
    Pageview {
        /// URL of the page viewed
        url: String,
        /// Title of the page
        #[arg(long)]
        title: Option<String>,
        /// Extra parameter to send (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Send an event hit and wait for delivery
    Event {
        /// Event category
        category: String,
        /// Event action
        action: String,
        /// Event label
        #[arg(long)]
        label: Option<String>,
        /// Numeric event value
        #[arg(long)]
        value: Option<i64>,
        /// Extra parameter to send (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Run database migrations and exit
    ///
    /// Useful for Kubernetes init containers or CI/CD pipelines.
    Migrate,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./docs-analytics.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn extras_from(params: Vec<(String, String)>) -> Extras {
    params
        .into_iter()
        .map(|(k, v)| {
            let value = ParamValue::parse_lossy(&v);
            (k, value)
        })
        .collect()
}

/// Default configuration written by `init`.
fn default_config_toml() -> &'static str {
    r#"# Documentation analytics worker configuration

[analytics]
enabled = true
# Set the site identifier here, or export ANALYTICS_TRACKING_ID and use:
# tracking_id = "${ANALYTICS_TRACKING_ID}"
tracking_id = ""
# collector_url = "https://www.google-analytics.com/collect"
timeout_secs = 3
validate_events = true

[tasks]
web_workers = 4
background_workers = 1
queue_capacity = 1000

[retention]
enabled = true
interval_hours = 24
pageview_days = 90
scan_window_days = 90
dry_run = false

[database]
type = "sqlite"
path = "docs-analytics.db"

[organizations]
enabled = false

[observability.logging]
level = "info"
format = "compact"
"#
}

/// Resolve and load the config. Falls back to defaults when no file exists and
/// none was requested.
fn load_config(explicit_path: Option<&str>) -> (AppConfig, Option<PathBuf>) {
    let path = match explicit_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                eprintln!("Error: Config file not found: {}", path.display());
                std::process::exit(1);
            }
            Some(path)
        }
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };

    let Some(path) = path else {
        return (AppConfig::default(), None);
    };

    match AppConfig::from_file(&path) {
        Ok(config) => (config, Some(path)),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn init_observability(config: &AppConfig) {
    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = metrics::init_metrics(&config.observability.metrics) {
        tracing::error!(error = %e, "Failed to initialize metrics");
        std::process::exit(1);
    }
}

/// Connect to the configured database, or keep records in memory when none
/// is configured.
async fn open_database(config: &AppConfig) -> Arc<Database> {
    if config.database.is_none() {
        tracing::warn!("No database configured, page views are kept in memory");
        return Arc::new(Database::in_memory());
    }

    let database = match Database::from_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if config.database.run_migrations()
        && let Err(e) = database.run_migrations().await
    {
        tracing::error!(error = %e, "Database migrations failed");
        eprintln!("Error: Database migrations failed: {}", e);
        std::process::exit(1);
    }

    Arc::new(database)
}

fn build_services(config: &AppConfig, database: Arc<Database>) -> Arc<AppServices> {
    match AppServices::from_config(config, database) {
        Ok(services) => Arc::new(services),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build analytics transport");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => run_init(output, force),
        Some(Command::Migrate) => run_migrate(args.config.as_deref()).await,
        Some(Command::Sweep { dry_run }) => run_sweep(args.config.as_deref(), dry_run).await,
        Some(Command::Pageview { url, title, params }) => {
            let event = AnalyticsEvent::pageview(url, title);
            run_send(args.config.as_deref(), event, extras_from(params)).await;
        }
        Some(Command::Event {
            category,
            action,
            label,
            value,
            params,
        }) => {
            let event = AnalyticsEvent::event(category, action, label, value);
            run_send(args.config.as_deref(), event, extras_from(params)).await;
        }
        Some(Command::Worker) | None => run_worker(args.config.as_deref()).await,
    }
}

/// Initialize a new configuration file
fn run_init(output: Option<String>, force: bool) {
    let output_path = PathBuf::from(output.unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string()));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    // Create parent directories if needed
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("To start the worker, run:");
    println!("  docs-analytics --config {} worker", output_path.display());
}

/// Run the task workers until Ctrl+C or SIGTERM.
async fn run_worker(explicit_config_path: Option<&str>) {
    let (config, config_path) = load_config(explicit_config_path);
    init_observability(&config);

    tracing::info!(
        config_file = ?config_path,
        analytics_enabled = config.analytics.enabled,
        retention_enabled = config.retention.enabled,
        "Starting analytics worker"
    );

    let database = open_database(&config).await;
    tracing::info!(backend = database.backend(), "Page-view storage ready");

    let services = build_services(&config, database);
    let pool = Arc::new(WorkerPool::start(&config.tasks, services));

    let queue: Arc<dyn TaskQueue> = pool.clone();
    let scheduler = tokio::spawn(start_retention_scheduler(
        queue,
        config.retention.clone(),
        pool.cancellation_token(),
    ));

    shutdown_signal().await;

    tracing::info!("Shutdown signal received, waiting for queued tasks to complete...");
    if pool.shutdown_with_timeout(SHUTDOWN_TIMEOUT).await {
        tracing::info!("All queued tasks completed");
    } else {
        tracing::warn!("Timeout waiting for queued tasks, some may not have completed");
    }
    if let Err(e) = scheduler.await {
        tracing::warn!(error = %e, "Retention scheduler did not stop cleanly");
    }
    tracing::info!(rejected = pool.rejected_count(), "Shutdown complete");
}

/// Run one retention sweep and print its summary.
async fn run_sweep(explicit_config_path: Option<&str>, dry_run: bool) {
    let (config, _) = load_config(explicit_config_path);
    init_observability(&config);

    if config.database.is_none() {
        eprintln!("Error: Database is not configured. Nothing to sweep.");
        std::process::exit(1);
    }

    let database = open_database(&config).await;
    let sweeper = PageViewSweeper::new(database.page_views(), &config.retention)
        .with_dry_run(dry_run || config.retention.dry_run);
    let result = sweeper.sweep_old_pageviews().await;

    match result {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: Failed to encode sweep summary: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Dispatch one hit through an inline queue so it is delivered before exit.
async fn run_send(explicit_config_path: Option<&str>, event: AnalyticsEvent, extras: Extras) {
    let (config, _) = load_config(explicit_config_path);
    init_observability(&config);

    let services = build_services(&config, Arc::new(Database::in_memory()));
    let queue: Arc<dyn TaskQueue> = Arc::new(InlineQueue::new(services));
    let dispatcher = AnalyticsDispatcher::from_config(queue, &config.analytics);

    match dispatcher.dispatch(event, extras).await {
        Ok(ticket) => println!("{} {}", ticket.kind, ticket.id),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run database migrations and exit.
///
/// Exits with code 0 on success, 1 on failure.
async fn run_migrate(explicit_config_path: Option<&str>) {
    let (config, config_path) = load_config(explicit_config_path);
    init_observability(&config);

    tracing::info!(config_file = ?config_path, "Running database migrations");

    if config.database.is_none() {
        eprintln!("Error: Database is not configured. Nothing to migrate.");
        std::process::exit(1);
    }

    match Database::from_config(&config.database).await {
        Ok(db) => match db.run_migrations().await {
            Ok(()) => {
                tracing::info!("Database migrations completed successfully");
            }
            Err(e) => {
                tracing::error!(error = %e, "Database migrations failed");
                eprintln!("Error: Database migrations failed: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
