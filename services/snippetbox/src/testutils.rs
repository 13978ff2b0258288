//! In-process test client for the full router

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, OnceLock},
};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use regex::Regex;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use crate::{
    config::WebConfig,
    repositories::{InMemorySnippetRepository, InMemoryUserRepository, UserModel},
    routes::create_router,
    state::AppState,
};

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Router over in-memory models with a cookie jar carried between requests.
///
/// Seeded with one live snippet (id 1), one expired snippet (id 2) and the
/// user Alice (id 1, `alice@example.com` / `pa$$word`).
pub struct TestServer {
    app: Router,
    cookies: Mutex<BTreeMap<String, String>>,
    pub users: InMemoryUserRepository,
}

impl TestServer {
    pub async fn new() -> Self {
        let snippets = InMemorySnippetRepository::new();
        let now = Utc::now();
        snippets.insert_with_times(
            "An old silent pond",
            "An old silent pond...",
            now,
            now + Duration::days(365),
        );
        snippets.insert_with_times(
            "Long gone",
            "This one has expired",
            now - Duration::days(8),
            now - Duration::days(1),
        );

        let users = InMemoryUserRepository::new();
        users
            .insert("Alice", "alice@example.com", "pa$$word")
            .await
            .unwrap();

        let state = AppState::new(Arc::new(snippets), Arc::new(users.clone()));
        let app = create_router(state, MemoryStore::default(), &WebConfig::default());

        Self {
            app,
            cookies: Mutex::new(BTreeMap::new()),
            users,
        }
    }

    /// Current value of a cookie in the jar
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }

    /// Overwrite a jar entry, as a client replaying an old cookie would
    pub fn set_cookie(&self, name: &str, value: &str) {
        self.cookies
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookies.lock().unwrap();
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn store_cookies(&self, headers: &HeaderMap) {
        let mut cookies = self.cookies.lock().unwrap();
        for set_cookie in headers.get_all(header::SET_COOKIE) {
            let raw = set_cookie.to_str().unwrap();
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            if raw.contains("Max-Age=0") || value.is_empty() {
                cookies.remove(name.trim());
            } else {
                cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    async fn send(&self, mut request: Request<Body>) -> TestResponse {
        if let Some(cookie) = self.cookie_header() {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.app.clone().oneshot(request).await.unwrap();
        self.store_cookies(response.headers());

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_form(&self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = serde_urlencoded::to_string(fields).unwrap();
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Fetch the login form for a token, then submit credentials
    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        let token = extract_csrf_token(&self.get("/user/login").await.body);
        self.post_form(
            "/user/login",
            &[
                ("email", email),
                ("password", password),
                ("csrf_token", &token),
            ],
        )
        .await
    }
}

pub fn extract_csrf_token(body: &str) -> String {
    static CSRF_RX: OnceLock<Regex> = OnceLock::new();
    let rx = CSRF_RX.get_or_init(|| {
        Regex::new(r#"<input type="hidden" name="csrf_token" value="(.+?)">"#).unwrap()
    });
    rx.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .expect("no CSRF token in page")
}
