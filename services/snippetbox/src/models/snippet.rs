//! Snippet entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::templates::human_date;

/// A stored piece of text. Visible only while `Utc::now() < expires`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Snippet {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl Snippet {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }

    pub fn human_created(&self) -> String {
        human_date(&self.created)
    }

    pub fn human_expires(&self) -> String {
        human_date(&self.expires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let snippet = Snippet {
            id: 1,
            title: "An old silent pond".to_string(),
            content: "An old silent pond...".to_string(),
            created: now - Duration::days(1),
            expires: now,
        };

        assert!(!snippet.is_expired_at(now - Duration::seconds(1)));
        assert!(snippet.is_expired_at(now));
    }
}
