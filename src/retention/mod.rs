//! Page-view retention.
//!
//! Stored page views older than the configured number of days are deleted by
//! a recurring sweep. Each sweep only looks at a bounded slice of dates below
//! the horizon, see [`RetentionWindow`].

mod window;
mod worker;

pub use window::RetentionWindow;
pub use worker::{PageViewSweeper, RetentionError, SweepSummary, start_retention_scheduler};
