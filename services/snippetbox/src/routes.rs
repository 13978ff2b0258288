//! Route table and middleware stack

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir};
use tower_sessions::{
    Expiry, SessionManagerLayer, SessionStore,
    cookie::{SameSite, time::Duration},
};

use crate::{
    config::WebConfig,
    handlers,
    middleware::{
        authenticate, common_headers, csrf_protect, log_request, recover_panic,
        require_authentication, scope_request_line,
    },
    state::AppState,
};

/// Create the router for the web service
pub fn create_router<S>(state: AppState, store: S, config: &WebConfig) -> Router
where
    S: SessionStore + Clone,
{
    let sessions = SessionManagerLayer::new(store)
        .with_http_only(true)
        .with_path("/")
        .with_same_site(SameSite::Lax)
        .with_secure(config.session_cookie_secure)
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            config.session_lifetime_hours,
        )));

    let protected_routes = Router::new()
        .route(
            "/snippet/create",
            get(handlers::snippet_create).post(handlers::snippet_create_post),
        )
        .route("/account/view", get(handlers::account_view))
        .route(
            "/account/password/update",
            get(handlers::account_password_update).post(handlers::account_password_update_post),
        )
        .route("/user/logout", post(handlers::user_logout_post))
        .route_layer(middleware::from_fn(require_authentication));

    let dynamic_routes = Router::new()
        .route("/", get(handlers::home))
        .route("/about", get(handlers::about))
        .route("/snippet/view/:id", get(handlers::snippet_view))
        .route(
            "/user/signup",
            get(handlers::user_signup).post(handlers::user_signup_post),
        )
        .route(
            "/user/login",
            get(handlers::user_login).post(handlers::user_login_post),
        )
        .merge(protected_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .route_layer(middleware::from_fn(csrf_protect))
        .route_layer(sessions)
        .with_state(state);

    let app = Router::new()
        .route("/ping", get(handlers::ping))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .merge(dynamic_routes);

    with_common_layers(app)
}

/// Panic recovery, request logging and security headers, applied to every
/// route including static files.
pub fn with_common_layers(router: Router) -> Router {
    router
        .layer(middleware::from_fn(common_headers))
        .layer(middleware::from_fn(log_request))
        .layer(CatchPanicLayer::custom(recover_panic))
        // outside the panic layer so the scope survives the unwind
        .layer(middleware::from_fn(scope_request_line))
}
