//! Web server configuration

use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

const DEFAULT_ADDR: &str = "0.0.0.0:4000";
const DEFAULT_SESSION_LIFETIME_HOURS: i64 = 12;
const MAX_SESSION_LIFETIME_HOURS: i64 = 24 * 365;

/// Listener, static assets and session cookie settings
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    pub session_lifetime_hours: i64,
    pub session_cookie_secure: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 4000)),
            static_dir: default_static_dir(),
            session_lifetime_hours: DEFAULT_SESSION_LIFETIME_HOURS,
            session_cookie_secure: true,
        }
    }
}

fn default_static_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static")
}

/// Whole hours between one and a year; anything else is rejected.
fn parse_lifetime_hours(raw: &str) -> Option<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|hours| (1..=MAX_SESSION_LIFETIME_HOURS).contains(hours))
}

impl WebConfig {
    /// Create a new WebConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let addr = env::var("WEB_ADDR")
            .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
            .parse()
            .context("WEB_ADDR must be a socket address such as 0.0.0.0:4000")?;

        let static_dir = env::var("WEB_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_static_dir());

        let session_lifetime_hours = match env::var("SESSION_LIFETIME_HOURS") {
            Ok(raw) => parse_lifetime_hours(&raw).unwrap_or_else(|| {
                warn!(
                    "Invalid SESSION_LIFETIME_HOURS {:?}, expected 1..={}, using default",
                    raw, MAX_SESSION_LIFETIME_HOURS
                );
                DEFAULT_SESSION_LIFETIME_HOURS
            }),
            Err(_) => DEFAULT_SESSION_LIFETIME_HOURS,
        };

        let session_cookie_secure = env::var("SESSION_COOKIE_SECURE")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);

        Ok(Self {
            addr,
            static_dir,
            session_lifetime_hours,
            session_cookie_secure,
        })
    }
}
