//! In-process page-view store.
//!
//! Used when no database is configured and in tests. Contents are lost on
//! restart.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{PageViewRepo, validate_create},
    },
    models::{CreatePageView, PageView},
};

#[derive(Default)]
pub struct InMemoryPageViewRepo {
    rows: DashMap<Uuid, PageView>,
}

impl InMemoryPageViewRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn ids_between(&self, after: NaiveDate, before: NaiveDate) -> Vec<Uuid> {
        self.rows
            .iter()
            .filter(|entry| entry.date > after && entry.date < before)
            .map(|entry| *entry.key())
            .collect()
    }
}

#[async_trait]
impl PageViewRepo for InMemoryPageViewRepo {
    async fn create(&self, input: CreatePageView) -> DbResult<PageView> {
        validate_create(&input)?;

        let row = PageView {
            id: Uuid::new_v4(),
            project: input.project,
            version: input.version,
            path: input.path,
            view_count: input.view_count,
            date: input.date,
        };
        self.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<PageView>> {
        Ok(self.rows.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_all(&self) -> DbResult<Vec<PageView>> {
        let mut rows: Vec<PageView> = self.rows.iter().map(|e| e.value().clone()).collect();
        rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.path.cmp(&b.path)));
        Ok(rows)
    }

    async fn count_between(&self, after: NaiveDate, before: NaiveDate) -> DbResult<u64> {
        Ok(self.ids_between(after, before).len() as u64)
    }

    async fn delete_between(&self, after: NaiveDate, before: NaiveDate) -> DbResult<Vec<Uuid>> {
        // Only rows this call actually removed are reported
        let deleted = self
            .ids_between(after, before)
            .into_iter()
            .filter(|id| self.rows.remove(id).is_some())
            .collect();
        Ok(deleted)
    }
}
