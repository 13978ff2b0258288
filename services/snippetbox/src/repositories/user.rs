//! PostgreSQL-backed user storage

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, warn};

use super::{
    PASSWORD_COST, RepositoryError, RepositoryResult, UserModel, hash_password, verify_password,
};
use crate::models::User;

/// Name of the unique constraint on `users.email`
const EMAIL_CONSTRAINT: &str = "users_uc_email";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// True when `err` is the unique violation on the email column
fn is_duplicate_email(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(EMAIL_CONSTRAINT)
        }
        _ => false,
    }
}

#[async_trait]
impl UserModel for UserRepository {
    async fn insert(&self, name: &str, email: &str, password: &str) -> RepositoryResult<()> {
        let hashed_password = hash_password(password, PASSWORD_COST).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, hashed_password, created)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(&hashed_password)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!("Created user account");
                Ok(())
            }
            Err(e) if is_duplicate_email(&e) => Err(RepositoryError::DuplicateEmail),
            Err(e) => Err(e.into()),
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> RepositoryResult<i32> {
        let row: Option<(i32, String)> =
            sqlx::query_as("SELECT id, hashed_password FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, hashed_password)) = row else {
            return Err(RepositoryError::InvalidCredentials);
        };

        if verify_password(password, &hashed_password).await? {
            Ok(id)
        } else {
            warn!(user_id = id, "Password mismatch on login");
            Err(RepositoryError::InvalidCredentials)
        }
    }

    async fn exists(&self, id: i32) -> RepositoryResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT true FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn get(&self, id: i32) -> RepositoryResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, hashed_password, created
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn password_update(
        &self,
        id: i32,
        current_password: &str,
        new_password: &str,
    ) -> RepositoryResult<()> {
        let hashed_password: String =
            sqlx::query_scalar("SELECT hashed_password FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        if !verify_password(current_password, &hashed_password).await? {
            return Err(RepositoryError::InvalidCredentials);
        }

        let new_hash = hash_password(new_password, PASSWORD_COST).await?;
        sqlx::query("UPDATE users SET hashed_password = $1 WHERE id = $2")
            .bind(&new_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!(user_id = id, "Updated password");
        Ok(())
    }
}
