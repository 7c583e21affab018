//! Environment-derived gateway configuration, built once at startup.

use std::time::Duration;

use crate::error::{GatewayError, Result};

#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the identity service.
    pub auth_url: String,
    /// Address the GraphQL endpoint binds to.
    pub bind_addr: String,
    /// Timeout for outbound identity-service calls. Expiry surfaces as
    /// `Unavailable`, never a hang.
    pub identity_timeout: Duration,
    /// Failed login attempts tolerated per username within the window.
    pub login_max_attempts: u32,
    pub login_window: Duration,
    /// Cap on concurrent identity-service lookups during field federation.
    pub federation_concurrency: usize,
    /// How long a resolved user record stays fresh in the federation cache.
    pub federation_cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_url: "http://localhost:3001".to_string(),
            bind_addr: "0.0.0.0:4000".to_string(),
            identity_timeout: Duration::from_secs(5),
            login_max_attempts: 5,
            login_window: Duration::from_secs(300),
            federation_concurrency: 8,
            federation_cache_ttl: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Read configuration from the environment, falling back to defaults for
    /// anything unset. A malformed value is a `Validation` error, not a panic.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            auth_url: env_or("AUTH_URL", defaults.auth_url),
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr),
            identity_timeout: Duration::from_secs(env_parse(
                "IDENTITY_TIMEOUT_SECS",
                defaults.identity_timeout.as_secs(),
            )?),
            login_max_attempts: env_parse("LOGIN_MAX_ATTEMPTS", defaults.login_max_attempts)?,
            login_window: Duration::from_secs(env_parse(
                "LOGIN_WINDOW_SECS",
                defaults.login_window.as_secs(),
            )?),
            federation_concurrency: env_parse(
                "FEDERATION_CONCURRENCY",
                defaults.federation_concurrency,
            )?,
            federation_cache_ttl: Duration::from_secs(env_parse(
                "FEDERATION_CACHE_TTL_SECS",
                defaults.federation_cache_ttl.as_secs(),
            )?),
        })
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| GatewayError::Validation(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}
