//! Data access for snippets and users
//!
//! Handlers only see the [`SnippetModel`] and [`UserModel`] traits. The
//! PostgreSQL implementations back the running service; the in-memory ones
//! back the handler tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Snippet, User};

pub mod memory;
pub mod snippet;
pub mod user;

pub use memory::{InMemorySnippetRepository, InMemoryUserRepository};
pub use snippet::SnippetRepository;
pub use user::UserRepository;

/// How many snippets the home page lists
pub const LATEST_LIMIT: usize = 10;

/// bcrypt work factor for stored password hashes
pub const PASSWORD_COST: u32 = 12;

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// No row matched, or the matching snippet has expired
    #[error("no matching record found")]
    NotFound,

    /// Unknown email or wrong password; deliberately not distinguished
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait SnippetModel: Send + Sync {
    /// Store a snippet expiring `expires_in_days` after now; returns its id
    async fn insert(&self, title: &str, content: &str, expires_in_days: i32)
    -> RepositoryResult<i32>;

    /// Fetch a live snippet. Expired and missing rows both yield `NotFound`.
    async fn get(&self, id: i32) -> RepositoryResult<Snippet>;

    /// Newest live snippets first, at most [`LATEST_LIMIT`]
    async fn latest(&self) -> RepositoryResult<Vec<Snippet>>;
}

#[async_trait]
pub trait UserModel: Send + Sync {
    /// Hash `password` and store a new account
    async fn insert(&self, name: &str, email: &str, password: &str) -> RepositoryResult<()>;

    /// Resolve credentials to a user id
    async fn authenticate(&self, email: &str, password: &str) -> RepositoryResult<i32>;

    async fn exists(&self, id: i32) -> RepositoryResult<bool>;

    async fn get(&self, id: i32) -> RepositoryResult<User>;

    /// Replace the password after re-checking the current one
    async fn password_update(
        &self,
        id: i32,
        current_password: &str,
        new_password: &str,
    ) -> RepositoryResult<()>;
}

/// Hash off the async executor; bcrypt is deliberately slow.
pub(crate) async fn hash_password(password: &str, cost: u32) -> RepositoryResult<String> {
    let password = password.to_string();
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hashed)
}

/// Compare off the async executor. A mismatch is `Ok(false)`.
pub(crate) async fn verify_password(password: &str, hashed: &str) -> RepositoryResult<bool> {
    let password = password.to_string();
    let hashed = hashed.to_string();
    let matched = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed)).await??;
    Ok(matched)
}

/// Fresh, migrated and emptied database for the ignored PostgreSQL tests
#[cfg(test)]
pub(crate) async fn postgres_test_pool() -> sqlx::PgPool {
    use common::database::{DatabaseConfig, init_pool};

    let config = DatabaseConfig::from_env().expect("database config");
    let pool = init_pool(&config).await.expect("database pool");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    sqlx::query("TRUNCATE users, snippets RESTART IDENTITY")
        .execute(&pool)
        .await
        .expect("truncate");
    pool
}
