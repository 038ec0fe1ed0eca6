//! Analytics delivery and page-view retention for a documentation host.
//!
//! - [`analytics`]: pageview and event hits sent to a Measurement Protocol collector
//! - [`tasks`]: the lane-based queue those hits (and sweeps) run on
//! - [`retention`]: periodic deletion of old page-view records
//! - [`middleware`]: guards for organization-scoped routes

pub mod analytics;
pub mod app;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod retention;
pub mod tasks;

pub use app::AppServices;
pub use config::AppConfig;
