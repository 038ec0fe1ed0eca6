use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{PageViewRepo, validate_create},
    },
    models::{CreatePageView, PageView},
};

pub struct PostgresPageViewRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresPageViewRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_page_view(row: &PgRow) -> PageView {
        PageView {
            id: row.get("id"),
            project: row.get("project"),
            version: row.get("version"),
            path: row.get("path"),
            view_count: row.get("view_count"),
            date: row.get("date"),
        }
    }
}

#[async_trait]
impl PageViewRepo for PostgresPageViewRepo {
    async fn create(&self, input: CreatePageView) -> DbResult<PageView> {
        validate_create(&input)?;

        let row = sqlx::query(
            r#"
            INSERT INTO page_views (id, project, version, path, view_count, date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, project, version, path, view_count, date
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.project)
        .bind(&input.version)
        .bind(&input.path)
        .bind(input.view_count)
        .bind(input.date)
        .fetch_one(&self.write_pool)
        .await?;

        Ok(Self::row_to_page_view(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<PageView>> {
        let row = sqlx::query(
            r#"
            SELECT id, project, version, path, view_count, date
            FROM page_views
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_page_view))
    }

    async fn list_all(&self) -> DbResult<Vec<PageView>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project, version, path, view_count, date
            FROM page_views
            ORDER BY date ASC, path ASC
            "#,
        )
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_page_view).collect())
    }

    async fn count_between(&self, after: NaiveDate, before: NaiveDate) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM page_views
            WHERE date < $1 AND date > $2
            "#,
        )
        .bind(before)
        .bind(after)
        .fetch_one(&self.read_pool)
        .await?;

        Ok(count as u64)
    }

    async fn delete_between(&self, after: NaiveDate, before: NaiveDate) -> DbResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM page_views
            WHERE date < $1 AND date > $2
            RETURNING id
            "#,
        )
        .bind(before)
        .bind(after)
        .fetch_all(&self.write_pool)
        .await?;

        Ok(ids)
    }
}
