//! User entity

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::templates::human_date;

/// Registered account. The hash is never serialized.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub created: DateTime<Utc>,
}

impl User {
    pub fn human_created(&self) -> String {
        human_date(&self.created)
    }
}
