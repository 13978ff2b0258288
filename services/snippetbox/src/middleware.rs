//! Request middleware
//!
//! Outermost first: request line scope, panic recovery, request logging,
//! security headers,
//! session loading (tower-sessions layer), CSRF protection, authentication.
//! Protected routes additionally pass through [`require_authentication`].

use std::{any::Any, net::SocketAddr};

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, Method, StatusCode, Uri, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use rand::{Rng, distributions::Alphanumeric};
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    error::{ServerFault, WebError},
    session::{AUTHENTICATED_USER_ID_KEY, AppSession, CSRF_TOKEN_KEY, REDIRECT_AFTER_LOGIN_KEY},
    state::AppState,
};

/// Per-session anti-forgery token, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

/// Set only when the session names a user that still exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i32);

const CSRF_TOKEN_LEN: usize = 32;

/// Same ceiling axum applies to form bodies by default
const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
struct RequestLine {
    method: Method,
    uri: Uri,
}

tokio::task_local! {
    static REQUEST_LINE: RequestLine;
}

/// Keep the method and URI reachable from [`recover_panic`], which only
/// receives the panic payload. Must wrap the panic layer.
pub async fn scope_request_line(req: Request, next: Next) -> Response {
    let line = RequestLine {
        method: req.method().clone(),
        uri: req.uri().clone(),
    };
    REQUEST_LINE.scope(line, next.run(req)).await
}

fn panic_context() -> (String, String) {
    REQUEST_LINE
        .try_with(|line| (line.method.to_string(), line.uri.to_string()))
        .unwrap_or_else(|_| ("-".to_string(), "-".to_string()))
}

/// Turn a handler panic into a 500 and close the connection.
pub fn recover_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    let (method, uri) = panic_context();
    error!(%method, %uri, panic = %detail, "Recovered from handler panic");

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::INTERNAL_SERVER_ERROR
            .canonical_reason()
            .unwrap_or("Internal Server Error"),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

pub async fn log_request(req: Request, next: Next) -> Response {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let proto = format!("{:?}", req.version());
    let method = req.method().clone();
    let uri = req.uri().clone();

    info!(%ip, %proto, %method, %uri, "received request");

    let response = next.run(req).await;

    if let Some(ServerFault(detail)) = response.extensions().get::<ServerFault>() {
        error!(%method, %uri, error = %detail, "Server error");
    }

    response
}

pub async fn common_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com",
        ),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("origin-when-cross-origin"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("0"));
    headers.insert(header::SERVER, HeaderValue::from_static("snippetbox"));

    response
}

#[derive(Deserialize)]
struct CsrfField {
    csrf_token: Option<String>,
}

fn generate_csrf_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CSRF_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn is_unsafe(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Ensure the session holds a CSRF token and, for state-changing methods,
/// require the submitted `csrf_token` form field to match it.
pub async fn csrf_protect(
    session: AppSession,
    req: Request,
    next: Next,
) -> Result<Response, WebError> {
    let token = match session.get::<String>(CSRF_TOKEN_KEY).await? {
        Some(token) => token,
        None => {
            let token = generate_csrf_token();
            session.put(CSRF_TOKEN_KEY, &token).await?;
            token
        }
    };

    let mut req = if is_unsafe(req.method()) {
        let (parts, body) = req.into_parts();
        let bytes = to_bytes(body, MAX_FORM_BYTES)
            .await
            .map_err(|_| WebError::BadRequest)?;

        let submitted = serde_urlencoded::from_bytes::<CsrfField>(&bytes)
            .ok()
            .and_then(|field| field.csrf_token);

        match submitted {
            Some(submitted) if constant_time_eq(submitted.as_bytes(), token.as_bytes()) => {}
            _ => {
                info!(method = %parts.method, uri = %parts.uri, "CSRF check failed");
                return Err(WebError::BadRequest);
            }
        }

        Request::from_parts(parts, Body::from(bytes))
    } else {
        req
    };

    req.extensions_mut().insert(CsrfToken(token));
    Ok(next.run(req).await)
}

/// Mark the request authenticated when the session's user id still resolves.
pub async fn authenticate(
    State(state): State<AppState>,
    session: AppSession,
    mut req: Request,
    next: Next,
) -> Result<Response, WebError> {
    if let Some(id) = session.get::<i32>(AUTHENTICATED_USER_ID_KEY).await? {
        if state.users.exists(id).await? {
            req.extensions_mut().insert(AuthenticatedUser(id));
        }
    }

    Ok(next.run(req).await)
}

/// Send anonymous visitors to the login page, remembering where they were
/// going. Pages behind this layer are never cached.
pub async fn require_authentication(
    session: AppSession,
    req: Request,
    next: Next,
) -> Result<Response, WebError> {
    if req.extensions().get::<AuthenticatedUser>().is_none() {
        session
            .put(REDIRECT_AFTER_LOGIN_KEY, req.uri().path())
            .await?;
        return Ok(Redirect::to("/user/login").into_response());
    }

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrf_tokens_are_random_alphanumeric() {
        let a = generate_csrf_token();
        let b = generate_csrf_token();
        assert_eq!(a.len(), CSRF_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"", b"a"));
    }

    #[test]
    fn test_csrf_field_peek_ignores_other_fields() {
        let field: CsrfField =
            serde_urlencoded::from_str("title=x&csrf_token=tok&expires=7").unwrap();
        assert_eq!(field.csrf_token.as_deref(), Some("tok"));

        let field: CsrfField = serde_urlencoded::from_str("title=x").unwrap();
        assert!(field.csrf_token.is_none());
    }

    #[test]
    fn test_recover_panic_closes_connection() {
        let response = recover_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[test]
    fn test_panic_context_outside_a_request() {
        assert_eq!(panic_context(), ("-".to_string(), "-".to_string()));
    }

    #[tokio::test]
    async fn test_panic_context_inside_a_request() {
        let line = RequestLine {
            method: Method::POST,
            uri: "/snippet/create?x=1".parse().unwrap(),
        };
        let context = REQUEST_LINE.scope(line, async { panic_context() }).await;
        assert_eq!(
            context,
            ("POST".to_string(), "/snippet/create?x=1".to_string())
        );
    }
}
