//! HTML page rendering
//!
//! Every page is an askama template compiled into the binary. Layout
//! (`base.html`) and partials are resolved when the crate is built, so a page
//! that does not exist cannot be requested at runtime. Pages render into a
//! `String` before any status line is produced.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Datelike, Utc};

use crate::{
    error::WebError,
    forms::{AccountPasswordUpdateForm, SnippetCreateForm, UserLoginForm, UserSignupForm},
    models::{Snippet, User},
    validator::Validator,
};

/// Data every page receives
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
}

impl TemplateData {
    pub fn new(flash: Option<String>, is_authenticated: bool, csrf_token: String) -> Self {
        Self {
            current_year: Utc::now().year(),
            flash,
            is_authenticated,
            csrf_token,
        }
    }
}

/// Format a timestamp as `02 Jan 2006 at 15:04` (UTC)
pub fn human_date(t: &DateTime<Utc>) -> String {
    t.format("%d %b %Y at %H:%M").to_string()
}

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomePage {
    pub data: TemplateData,
    pub snippets: Vec<Snippet>,
}

#[derive(Template)]
#[template(path = "pages/view.html")]
pub struct SnippetViewPage {
    pub data: TemplateData,
    pub snippet: Snippet,
}

#[derive(Template)]
#[template(path = "pages/create.html")]
pub struct SnippetCreatePage {
    pub data: TemplateData,
    pub form: SnippetCreateForm,
    pub errors: Validator,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupPage {
    pub data: TemplateData,
    pub form: UserSignupForm,
    pub errors: Validator,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginPage {
    pub data: TemplateData,
    pub form: UserLoginForm,
    pub errors: Validator,
}

#[derive(Template)]
#[template(path = "pages/account.html")]
pub struct AccountPage {
    pub data: TemplateData,
    pub user: User,
}

#[derive(Template)]
#[template(path = "pages/password.html")]
pub struct PasswordUpdatePage {
    pub data: TemplateData,
    pub form: AccountPasswordUpdateForm,
    pub errors: Validator,
}

#[derive(Template)]
#[template(path = "pages/about.html")]
pub struct AboutPage {
    pub data: TemplateData,
}

/// Render `page` and only then attach `status`.
///
/// A failure part-way through rendering becomes a 500; the client never sees
/// a half-written page under a success status.
pub fn render<T: Template>(status: StatusCode, page: &T) -> Result<Response, WebError> {
    let body = page
        .render()
        .map_err(|e| WebError::Internal(anyhow::Error::new(e).context("template rendering")))?;
    Ok((status, Html(body)).into_response())
}
