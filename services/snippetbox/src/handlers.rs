//! HTTP handlers
//!
//! Every handler returns `WebResult<Response>`: a rendered page, a 303
//! redirect, or a [`WebError`] that becomes a bare status response.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tracing::info;

use crate::{
    error::{WebError, WebResult},
    forms::{
        AccountPasswordUpdateForm, PostForm, SnippetCreateForm, UserLoginForm, UserSignupForm,
    },
    middleware::{AuthenticatedUser, CsrfToken},
    repositories::RepositoryError,
    session::{AUTHENTICATED_USER_ID_KEY, AppSession, FLASH_KEY, REDIRECT_AFTER_LOGIN_KEY},
    state::AppState,
    templates::{
        AboutPage, AccountPage, HomePage, LoginPage, PasswordUpdatePage, SignupPage,
        SnippetCreatePage, SnippetViewPage, TemplateData, render,
    },
    validator::Validator,
};

const DEFAULT_LANDING: &str = "/account/view";

/// What a page needs from the request: session, CSRF token, current user.
pub struct PageContext {
    session: AppSession,
    csrf_token: String,
    user: Option<AuthenticatedUser>,
}

impl PageContext {
    pub fn session(&self) -> &AppSession {
        &self.session
    }

    pub fn user_id(&self) -> Option<i32> {
        self.user.map(|AuthenticatedUser(id)| id)
    }

    /// Build the page envelope. Consumes the pending flash message, so call
    /// it only when a page is actually rendered.
    pub async fn template_data(&self) -> WebResult<TemplateData> {
        let flash = self.session.pop::<String>(FLASH_KEY).await?;
        Ok(TemplateData::new(
            flash,
            self.user.is_some(),
            self.csrf_token.clone(),
        ))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = AppSession::from_request_parts(parts, state).await?;
        let CsrfToken(csrf_token) = parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .ok_or_else(|| WebError::Internal(anyhow::anyhow!("CSRF middleware not installed")))?;
        let user = parts.extensions.get::<AuthenticatedUser>().copied();

        Ok(Self {
            session,
            csrf_token,
            user,
        })
    }
}

/// Positive integer ids only; anything else is a missing page.
fn parse_id(raw: &str) -> WebResult<i32> {
    match raw.parse::<i32>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(WebError::NotFound),
    }
}

pub async fn ping() -> &'static str {
    "OK"
}

pub async fn home(ctx: PageContext, State(state): State<AppState>) -> WebResult<Response> {
    let snippets = state.snippets.latest().await?;
    let page = HomePage {
        data: ctx.template_data().await?,
        snippets,
    };
    render(StatusCode::OK, &page)
}

pub async fn about(ctx: PageContext) -> WebResult<Response> {
    let page = AboutPage {
        data: ctx.template_data().await?,
    };
    render(StatusCode::OK, &page)
}

pub async fn snippet_view(
    ctx: PageContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Response> {
    let id = parse_id(&id)?;
    let snippet = state.snippets.get(id).await?;
    let page = SnippetViewPage {
        data: ctx.template_data().await?,
        snippet,
    };
    render(StatusCode::OK, &page)
}

pub async fn snippet_create(ctx: PageContext) -> WebResult<Response> {
    let page = SnippetCreatePage {
        data: ctx.template_data().await?,
        form: SnippetCreateForm::default(),
        errors: Validator::new(),
    };
    render(StatusCode::OK, &page)
}

pub async fn snippet_create_post(
    ctx: PageContext,
    State(state): State<AppState>,
    PostForm(form): PostForm<SnippetCreateForm>,
) -> WebResult<Response> {
    let errors = form.validate();
    if !errors.valid() {
        let page = SnippetCreatePage {
            data: ctx.template_data().await?,
            form,
            errors,
        };
        return render(StatusCode::UNPROCESSABLE_ENTITY, &page);
    }

    let id = state
        .snippets
        .insert(&form.title, &form.content, form.expires)
        .await?;
    ctx.session()
        .put(FLASH_KEY, "Snippet successfully created")
        .await?;

    Ok(Redirect::to(&format!("/snippet/view/{}", id)).into_response())
}

pub async fn user_signup(ctx: PageContext) -> WebResult<Response> {
    let page = SignupPage {
        data: ctx.template_data().await?,
        form: UserSignupForm::default(),
        errors: Validator::new(),
    };
    render(StatusCode::OK, &page)
}

pub async fn user_signup_post(
    ctx: PageContext,
    State(state): State<AppState>,
    PostForm(form): PostForm<UserSignupForm>,
) -> WebResult<Response> {
    let mut errors = form.validate();

    if errors.valid() {
        match state
            .users
            .insert(&form.name, &form.email, &form.password)
            .await
        {
            Ok(()) => {
                info!(email = %form.email, "New user signed up");
                ctx.session()
                    .put(FLASH_KEY, "Your signup was successful. Please log in.")
                    .await?;
                return Ok(Redirect::to("/user/login").into_response());
            }
            Err(RepositoryError::DuplicateEmail) => {
                errors.add_field_error("email", "Email address is already in use");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let page = SignupPage {
        data: ctx.template_data().await?,
        form: UserSignupForm {
            password: String::new(),
            ..form
        },
        errors,
    };
    render(StatusCode::UNPROCESSABLE_ENTITY, &page)
}

pub async fn user_login(ctx: PageContext) -> WebResult<Response> {
    let page = LoginPage {
        data: ctx.template_data().await?,
        form: UserLoginForm::default(),
        errors: Validator::new(),
    };
    render(StatusCode::OK, &page)
}

pub async fn user_login_post(
    ctx: PageContext,
    State(state): State<AppState>,
    PostForm(form): PostForm<UserLoginForm>,
) -> WebResult<Response> {
    let mut errors = form.validate();

    if errors.valid() {
        match state.users.authenticate(&form.email, &form.password).await {
            Ok(id) => {
                let session = ctx.session();
                session.renew().await?;
                session.put(AUTHENTICATED_USER_ID_KEY, id).await?;

                let target = session
                    .pop::<String>(REDIRECT_AFTER_LOGIN_KEY)
                    .await?
                    .unwrap_or_else(|| DEFAULT_LANDING.to_string());
                return Ok(Redirect::to(&target).into_response());
            }
            Err(RepositoryError::InvalidCredentials) => {
                errors.add_non_field_error("Email or password is incorrect");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let page = LoginPage {
        data: ctx.template_data().await?,
        form: UserLoginForm {
            password: String::new(),
            ..form
        },
        errors,
    };
    render(StatusCode::UNPROCESSABLE_ENTITY, &page)
}

pub async fn user_logout_post(ctx: PageContext) -> WebResult<Response> {
    let session = ctx.session();
    session.renew().await?;
    session.remove(AUTHENTICATED_USER_ID_KEY).await?;
    session
        .put(FLASH_KEY, "You've been logged out successfully")
        .await?;
    Ok(Redirect::to("/").into_response())
}

pub async fn account_view(ctx: PageContext, State(state): State<AppState>) -> WebResult<Response> {
    let Some(id) = ctx.user_id() else {
        return Ok(Redirect::to("/user/login").into_response());
    };

    let user = match state.users.get(id).await {
        Ok(user) => user,
        Err(RepositoryError::NotFound) => return Ok(Redirect::to("/user/login").into_response()),
        Err(e) => return Err(e.into()),
    };

    let page = AccountPage {
        data: ctx.template_data().await?,
        user,
    };
    render(StatusCode::OK, &page)
}

pub async fn account_password_update(ctx: PageContext) -> WebResult<Response> {
    let page = PasswordUpdatePage {
        data: ctx.template_data().await?,
        form: AccountPasswordUpdateForm::default(),
        errors: Validator::new(),
    };
    render(StatusCode::OK, &page)
}

pub async fn account_password_update_post(
    ctx: PageContext,
    State(state): State<AppState>,
    PostForm(form): PostForm<AccountPasswordUpdateForm>,
) -> WebResult<Response> {
    let Some(id) = ctx.user_id() else {
        return Ok(Redirect::to("/user/login").into_response());
    };

    let mut errors = form.validate();

    if errors.valid() {
        match state
            .users
            .password_update(id, &form.current_password, &form.new_password)
            .await
        {
            Ok(()) => {
                ctx.session()
                    .put(FLASH_KEY, "Password updated successfully")
                    .await?;
                return Ok(Redirect::to(DEFAULT_LANDING).into_response());
            }
            Err(RepositoryError::InvalidCredentials) => {
                errors.add_field_error("current_password", "Current password is incorrect");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let page = PasswordUpdatePage {
        data: ctx.template_data().await?,
        form: AccountPasswordUpdateForm::default(),
        errors,
    };
    render(StatusCode::UNPROCESSABLE_ENTITY, &page)
}
