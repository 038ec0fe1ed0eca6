use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    db::error::{DbError, DbResult},
    models::{CreatePageView, PageView},
};

/// Storage for per-day page-view counters.
///
/// Range operations take two exclusive bounds: a record matches when
/// `after < date < before`.
#[async_trait]
pub trait PageViewRepo: Send + Sync {
    /// Store a new page-view record.
    async fn create(&self, input: CreatePageView) -> DbResult<PageView>;

    /// Get a record by ID.
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<PageView>>;

    /// List every record, ordered by date then path.
    async fn list_all(&self) -> DbResult<Vec<PageView>>;

    // ==================== Retention Operations ====================

    /// Count records with `after < date < before`.
    async fn count_between(&self, after: NaiveDate, before: NaiveDate) -> DbResult<u64>;

    /// Delete records with `after < date < before`.
    ///
    /// Returns the IDs of the rows removed by this call. Rows already removed
    /// by a concurrent sweep are not reported again.
    async fn delete_between(&self, after: NaiveDate, before: NaiveDate) -> DbResult<Vec<Uuid>>;
}

/// Reject inputs no backend should store.
pub(crate) fn validate_create(input: &CreatePageView) -> DbResult<()> {
    if input.project.is_empty() {
        return Err(DbError::Validation("project cannot be empty".into()));
    }
    if input.view_count < 0 {
        return Err(DbError::Validation(format!(
            "view_count cannot be negative: {}",
            input.view_count
        )));
    }
    Ok(())
}
