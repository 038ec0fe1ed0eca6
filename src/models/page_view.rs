use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregated views of one documentation page on one calendar day.
///
/// Records are written elsewhere as pages are served. This crate only reads
/// and bulk-deletes them during retention sweeps; they are never updated in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageView {
    pub id: Uuid,
    /// Project slug
    pub project: String,
    /// Version slug
    pub version: String,
    /// Path of the page within the version
    pub path: String,
    pub view_count: i64,
    /// Day the views were counted on (no time component)
    pub date: NaiveDate,
}

/// Input for recording a page-view row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePageView {
    pub project: String,
    pub version: String,
    pub path: String,
    #[serde(default = "default_view_count")]
    pub view_count: i64,
    pub date: NaiveDate,
}

impl CreatePageView {
    pub fn new(
        project: impl Into<String>,
        version: impl Into<String>,
        path: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            project: project.into(),
            version: version.into(),
            path: path.into(),
            view_count: default_view_count(),
            date,
        }
    }
}

fn default_view_count() -> i64 {
    1
}
