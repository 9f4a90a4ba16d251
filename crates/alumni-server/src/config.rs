use std::net::SocketAddr;

use crate::env::{env_parse, env_string};
use crate::error::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://alumni.db?mode=rwc";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_WEB_URL: &str = "http://localhost:5173";
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 100_000;
pub const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Frontend origin allowed by CORS.
    pub web_url: String,
    pub apify_token: Option<String>,
    pub password_iterations: u32,
    pub session_ttl_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            web_url: DEFAULT_WEB_URL.to_string(),
            apify_token: None,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_string("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr.parse().map_err(|_| {
            Error::Internal(format!("BIND_ADDR is not a socket address: {bind_addr}"))
        })?;

        let password_iterations = env_parse("PASSWORD_ITERATIONS", DEFAULT_PASSWORD_ITERATIONS)?;
        if password_iterations == 0 {
            return Err(Error::Internal("PASSWORD_ITERATIONS must be positive".to_string()));
        }

        Ok(Self {
            database_url: env_string("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            bind_addr,
            web_url: env_string("WEB_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_WEB_URL.to_string()),
            apify_token: env_string("APIFY_TOKEN"),
            password_iterations,
            session_ttl_secs: env_parse("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?,
        })
    }
}
