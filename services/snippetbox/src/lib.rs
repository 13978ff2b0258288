//! Snippetbox web service
//!
//! Server-rendered pastebin: users sign up, log in and share short text
//! snippets that expire after a chosen number of days. Snippets and users
//! live in PostgreSQL, sessions in Redis.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
    error::DatabaseError,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub mod config;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod state;
pub mod templates;
pub mod validator;

#[cfg(test)]
mod testutils;

use crate::{
    config::WebConfig,
    repositories::{SnippetRepository, UserRepository},
    session::RedisSessionStore,
    state::AppState,
};

/// Connect to PostgreSQL and Redis, apply migrations and serve until
/// Ctrl-C or SIGTERM.
pub async fn run() -> Result<()> {
    let web_config = WebConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    info!("Database migrations applied");

    // Sessions live in Redis
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config)?;
    if !redis_pool.health_check().await? {
        warn!("Redis did not answer PING; sessions will fail until it does");
    }

    let state = AppState::new(
        Arc::new(SnippetRepository::new(pool.clone())),
        Arc::new(UserRepository::new(pool)),
    );
    let app = routes::create_router(state, RedisSessionStore::new(redis_pool), &web_config);

    let listener = TcpListener::bind(web_config.addr).await?;
    info!("Snippetbox listening on {}", web_config.addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Snippetbox stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
