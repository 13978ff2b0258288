//! In-memory model implementations
//!
//! Deterministic stand-ins for the PostgreSQL repositories: ids are assigned
//! sequentially from 1, the same expiry and uniqueness rules apply, and
//! passwords are still bcrypt-hashed (at a low cost).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    LATEST_LIMIT, RepositoryError, RepositoryResult, SnippetModel, UserModel, hash_password,
    verify_password,
};
use crate::models::{Snippet, User};

/// Keeps the test suite fast; production uses `PASSWORD_COST`.
const MEMORY_PASSWORD_COST: u32 = 4;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test must not poison the store for its neighbours
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySnippetRepository {
    snippets: Arc<Mutex<Vec<Snippet>>>,
}

impl InMemorySnippetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with explicit timestamps, e.g. an already expired snippet
    pub fn insert_with_times(
        &self,
        title: &str,
        content: &str,
        created: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> i32 {
        let mut snippets = lock(&self.snippets);
        let id = snippets.len() as i32 + 1;
        snippets.push(Snippet {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created,
            expires,
        });
        id
    }
}

#[async_trait]
impl SnippetModel for InMemorySnippetRepository {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_in_days: i32,
    ) -> RepositoryResult<i32> {
        let created = Utc::now();
        let expires = created + Duration::days(i64::from(expires_in_days));
        Ok(self.insert_with_times(title, content, created, expires))
    }

    async fn get(&self, id: i32) -> RepositoryResult<Snippet> {
        let now = Utc::now();
        lock(&self.snippets)
            .iter()
            .find(|s| s.id == id && !s.is_expired_at(now))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn latest(&self) -> RepositoryResult<Vec<Snippet>> {
        let now = Utc::now();
        Ok(lock(&self.snippets)
            .iter()
            .rev()
            .filter(|s| !s.is_expired_at(now))
            .take(LATEST_LIMIT)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<Mutex<Vec<User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an account, leaving any session that references it stale
    pub fn delete(&self, id: i32) {
        lock(&self.users).retain(|u| u.id != id);
    }

    fn hash_of(&self, id: i32) -> Option<String> {
        lock(&self.users)
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.hashed_password.clone())
    }
}

#[async_trait]
impl UserModel for InMemoryUserRepository {
    async fn insert(&self, name: &str, email: &str, password: &str) -> RepositoryResult<()> {
        let hashed_password = hash_password(password, MEMORY_PASSWORD_COST).await?;

        // Check and push under one lock, like a unique constraint
        let mut users = lock(&self.users);
        if users.iter().any(|u| u.email == email) {
            return Err(RepositoryError::DuplicateEmail);
        }
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        users.push(User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            hashed_password,
            created: Utc::now(),
        });
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> RepositoryResult<i32> {
        let found = lock(&self.users)
            .iter()
            .find(|u| u.email == email)
            .map(|u| (u.id, u.hashed_password.clone()));

        let Some((id, hashed_password)) = found else {
            return Err(RepositoryError::InvalidCredentials);
        };

        if verify_password(password, &hashed_password).await? {
            Ok(id)
        } else {
            Err(RepositoryError::InvalidCredentials)
        }
    }

    async fn exists(&self, id: i32) -> RepositoryResult<bool> {
        Ok(lock(&self.users).iter().any(|u| u.id == id))
    }

    async fn get(&self, id: i32) -> RepositoryResult<User> {
        lock(&self.users)
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn password_update(
        &self,
        id: i32,
        current_password: &str,
        new_password: &str,
    ) -> RepositoryResult<()> {
        let hashed_password = self.hash_of(id).ok_or(RepositoryError::NotFound)?;
        if !verify_password(current_password, &hashed_password).await? {
            return Err(RepositoryError::InvalidCredentials);
        }

        let new_hash = hash_password(new_password, MEMORY_PASSWORD_COST).await?;
        let mut users = lock(&self.users);
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepositoryError::NotFound)?;
        user.hashed_password = new_hash;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snippet_insert_and_get() {
        let repo = InMemorySnippetRepository::new();
        let id = repo.insert("Title", "Body", 7).await.unwrap();
        assert_eq!(id, 1);

        let snippet = repo.get(id).await.unwrap();
        assert_eq!(snippet.title, "Title");
        assert_eq!(snippet.content, "Body");
        assert_eq!((snippet.expires - snippet.created).num_days(), 7);
    }

    #[tokio::test]
    async fn test_expired_snippet_is_not_found() {
        let repo = InMemorySnippetRepository::new();
        let now = Utc::now();
        let id = repo.insert_with_times("Old", "Gone", now - Duration::days(2), now - Duration::days(1));

        assert!(matches!(repo.get(id).await, Err(RepositoryError::NotFound)));
        assert!(matches!(repo.get(99).await, Err(RepositoryError::NotFound)));
        assert!(repo.latest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_is_newest_first_and_limited() {
        let repo = InMemorySnippetRepository::new();
        for i in 0..12 {
            repo.insert(&format!("Snippet {i}"), "Body", 1).await.unwrap();
        }

        let latest = repo.latest().await.unwrap();
        assert_eq!(latest.len(), LATEST_LIMIT);
        assert_eq!(latest[0].id, 12);
        assert_eq!(latest[9].id, 3);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.insert("Bob", "bob@example.com", "validPa$$word").await.unwrap();

        let err = repo
            .insert("Robert", "bob@example.com", "otherPa$$word")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_authenticate_does_not_reveal_which_part_failed() {
        let repo = InMemoryUserRepository::new();
        repo.insert("Alice", "alice@example.com", "pa$$word").await.unwrap();

        assert_eq!(repo.authenticate("alice@example.com", "pa$$word").await.unwrap(), 1);
        assert!(matches!(
            repo.authenticate("alice@example.com", "wrong").await,
            Err(RepositoryError::InvalidCredentials)
        ));
        assert!(matches!(
            repo.authenticate("nobody@example.com", "pa$$word").await,
            Err(RepositoryError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_password_update_requires_current_password() {
        let repo = InMemoryUserRepository::new();
        repo.insert("Alice", "alice@example.com", "pa$$word").await.unwrap();

        assert!(matches!(
            repo.password_update(1, "wrong", "newPa$$word").await,
            Err(RepositoryError::InvalidCredentials)
        ));
        repo.password_update(1, "pa$$word", "newPa$$word").await.unwrap();

        assert!(repo.authenticate("alice@example.com", "newPa$$word").await.is_ok());
        assert!(repo.authenticate("alice@example.com", "pa$$word").await.is_err());
    }

    #[tokio::test]
    async fn test_exists_and_get() {
        let repo = InMemoryUserRepository::new();
        repo.insert("Alice", "alice@example.com", "pa$$word").await.unwrap();

        assert!(repo.exists(1).await.unwrap());
        assert!(!repo.exists(2).await.unwrap());
        assert_eq!(repo.get(1).await.unwrap().email, "alice@example.com");

        repo.delete(1);
        assert!(!repo.exists(1).await.unwrap());
        assert!(matches!(repo.get(1).await, Err(RepositoryError::NotFound)));
    }
}
