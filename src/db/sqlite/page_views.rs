use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{format_date, parse_date, parse_uuid};
use crate::{
    db::{
        error::DbResult,
        repos::{PageViewRepo, validate_create},
    },
    models::{CreatePageView, PageView},
};

pub struct SqlitePageViewRepo {
    pool: SqlitePool,
}

impl SqlitePageViewRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_page_view(row: &SqliteRow) -> DbResult<PageView> {
        Ok(PageView {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            project: row.get("project"),
            version: row.get("version"),
            path: row.get("path"),
            view_count: row.get("view_count"),
            date: parse_date(&row.get::<String, _>("date"))?,
        })
    }
}

#[async_trait]
impl PageViewRepo for SqlitePageViewRepo {
    async fn create(&self, input: CreatePageView) -> DbResult<PageView> {
        validate_create(&input)?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO page_views (id, project, version, path, view_count, date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.project)
        .bind(&input.version)
        .bind(&input.path)
        .bind(input.view_count)
        .bind(format_date(input.date))
        .execute(&self.pool)
        .await?;

        Ok(PageView {
            id,
            project: input.project,
            version: input.version,
            path: input.path,
            view_count: input.view_count,
            date: input.date,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<PageView>> {
        let row = sqlx::query(
            r#"
            SELECT id, project, version, path, view_count, date
            FROM page_views
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_page_view).transpose()
    }

    async fn list_all(&self) -> DbResult<Vec<PageView>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project, version, path, view_count, date
            FROM page_views
            ORDER BY date ASC, path ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_page_view).collect()
    }

    async fn count_between(&self, after: NaiveDate, before: NaiveDate) -> DbResult<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM page_views
            WHERE date < ? AND date > ?
            "#,
        )
        .bind(format_date(before))
        .bind(format_date(after))
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn delete_between(&self, after: NaiveDate, before: NaiveDate) -> DbResult<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            DELETE FROM page_views
            WHERE date < ? AND date > ?
            RETURNING id
            "#,
        )
        .bind(format_date(before))
        .bind(format_date(after))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| parse_uuid(&row.get::<String, _>("id")))
            .collect()
    }
}
