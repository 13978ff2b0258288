//! Submitted form shapes and their validation rules
//!
//! Each form is plain data decoded from `application/x-www-form-urlencoded`.
//! `validate` is a pure function returning the recorded failures; handlers
//! may add domain errors (duplicate email, bad credentials) to that result.

use async_trait::async_trait;
use axum::extract::{Form, FromRequest, Request};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    error::WebError,
    validator::{Validator, email_rx, matches, max_chars, min_chars, not_blank, permitted_value},
};

pub const BLANK: &str = "This field cannot be blank";

/// Allowed snippet lifetimes in days
pub const PERMITTED_EXPIRES: [i32; 3] = [1, 7, 365];

const MIN_PASSWORD_CHARS: usize = 8;

/// Width of the `users.name` and `users.email` columns
const MAX_USER_FIELD_CHARS: usize = 255;
const TOO_LONG_USER_FIELD: &str = "This field cannot be more than 255 characters long";

/// `expires` falls back to 0 (rejected) when absent from a submission; the
/// blank form shown to users starts at 365.
#[derive(Debug, Clone, Deserialize)]
pub struct SnippetCreateForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub expires: i32,
}

impl Default for SnippetCreateForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            expires: 365,
        }
    }
}

impl SnippetCreateForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(not_blank(&self.title), "title", BLANK);
        v.check_field(
            max_chars(&self.title, 100),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", BLANK);
        v.check_field(
            permitted_value(&self.expires, &PERMITTED_EXPIRES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserSignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl UserSignupForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(not_blank(&self.name), "name", BLANK);
        v.check_field(
            max_chars(&self.name, MAX_USER_FIELD_CHARS),
            "name",
            TOO_LONG_USER_FIELD,
        );
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(
            max_chars(&self.email, MAX_USER_FIELD_CHARS),
            "email",
            TOO_LONG_USER_FIELD,
        );
        v.check_field(
            matches(&self.email, email_rx()),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", BLANK);
        v.check_field(
            min_chars(&self.password, MIN_PASSWORD_CHARS),
            "password",
            "This field must be at least 8 characters long",
        );
        v
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserLoginForm {
    pub email: String,
    pub password: String,
}

impl UserLoginForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(
            matches(&self.email, email_rx()),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", BLANK);
        v
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountPasswordUpdateForm {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

impl AccountPasswordUpdateForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(not_blank(&self.current_password), "current_password", BLANK);
        v.check_field(not_blank(&self.new_password), "new_password", BLANK);
        v.check_field(
            not_blank(&self.new_password_confirmation),
            "new_password_confirmation",
            BLANK,
        );
        v.check_field(
            min_chars(&self.new_password, MIN_PASSWORD_CHARS),
            "new_password",
            "This field must be at least 8 characters long",
        );
        v.check_field(
            self.new_password == self.new_password_confirmation,
            "new_password_confirmation",
            "Passwords do not match",
        );
        v
    }
}

/// URL-encoded POST body; an undecodable body is a 400.
pub struct PostForm<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for PostForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state).await.map_err(|e| {
            debug!("Rejected form body: {}", e);
            WebError::BadRequest
        })?;
        Ok(Self(value))
    }
}
