//! Session state
//!
//! The session cookie carries only an opaque id; the data lives in a
//! [`SessionStore`]. Production uses [`RedisSessionStore`], tests use the
//! in-memory store from `tower-sessions`. Handlers go through [`AppSession`],
//! which offers put/get/pop/remove and token renewal and nothing else.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use common::cache::RedisPool;
use serde::{Serialize, de::DeserializeOwned};
use tower_sessions::{
    Session, SessionStore,
    cookie::time::OffsetDateTime,
    session::{Id, Record},
    session_store,
};
use tracing::debug;

use crate::error::WebError;

/// One-shot message shown on the next page
pub const FLASH_KEY: &str = "flash";
pub const AUTHENTICATED_USER_ID_KEY: &str = "authenticated_user_id";
/// Where to send the user after a successful login
pub const REDIRECT_AFTER_LOGIN_KEY: &str = "redirect_path_after_login";
pub const CSRF_TOKEN_KEY: &str = "csrf_token";

/// Request-scoped session handle
#[derive(Clone)]
pub struct AppSession(Session);

impl AppSession {
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    pub async fn put<T: Serialize + Send + Sync>(&self, key: &str, value: T) -> Result<()> {
        self.0
            .insert(key, value)
            .await
            .with_context(|| format!("writing session key {key}"))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.0
            .get(key)
            .await
            .with_context(|| format!("reading session key {key}"))
    }

    /// Read and delete in one step
    pub async fn pop<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.0
            .remove(key)
            .await
            .with_context(|| format!("popping session key {key}"))
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.0
            .remove_value(key)
            .await
            .with_context(|| format!("removing session key {key}"))?;
        Ok(())
    }

    /// Issue a new session id, keeping the data. Used on login and logout.
    pub async fn renew(&self) -> Result<()> {
        self.0.cycle_id().await.context("renewing session id")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AppSession
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| WebError::Internal(anyhow::anyhow!(msg)))?;
        Ok(Self(session))
    }
}

/// Session records stored as JSON in Redis, expiring with the session.
#[derive(Debug, Clone)]
pub struct RedisSessionStore {
    redis: RedisPool,
}

impl RedisSessionStore {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    fn key(id: &Id) -> String {
        format!("session:{}", id)
    }
}

/// Seconds left before `expiry`, never less than one
fn ttl_seconds(expiry: OffsetDateTime) -> u64 {
    let remaining = (expiry - OffsetDateTime::now_utc()).whole_seconds();
    remaining.max(1) as u64
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save(&self, record: &Record) -> session_store::Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| session_store::Error::Encode(e.to_string()))?;

        self.redis
            .set(
                &Self::key(&record.id),
                &payload,
                Some(ttl_seconds(record.expiry_date)),
            )
            .await
            .map_err(|e| session_store::Error::Backend(e.to_string()))
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let payload = self
            .redis
            .get(&Self::key(session_id))
            .await
            .map_err(|e| session_store::Error::Backend(e.to_string()))?;

        match payload {
            Some(payload) => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|e| session_store::Error::Decode(e.to_string())),
            None => Ok(None),
        }
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        let existed = self
            .redis
            .delete(&Self::key(session_id))
            .await
            .map_err(|e| session_store::Error::Backend(e.to_string()))?;
        debug!(existed, "Deleted session record");
        Ok(())
    }
}
