//! PostgreSQL-backed snippet storage

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;

use super::{LATEST_LIMIT, RepositoryError, RepositoryResult, SnippetModel};
use crate::models::Snippet;

/// Snippet repository
#[derive(Clone)]
pub struct SnippetRepository {
    pool: PgPool,
}

impl SnippetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnippetModel for SnippetRepository {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_in_days: i32,
    ) -> RepositoryResult<i32> {
        let created = Utc::now();
        let expires = created + Duration::days(i64::from(expires_in_days));

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO snippets (title, content, created, expires)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(created)
        .bind(expires)
        .fetch_one(&self.pool)
        .await?;

        info!(snippet_id = id, expires_in_days, "Created snippet");
        Ok(id)
    }

    async fn get(&self, id: i32) -> RepositoryResult<Snippet> {
        sqlx::query_as::<_, Snippet>(
            r#"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > NOW() AND id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn latest(&self) -> RepositoryResult<Vec<Snippet>> {
        let snippets = sqlx::query_as::<_, Snippet>(
            r#"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > NOW()
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(LATEST_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(snippets)
    }
}
