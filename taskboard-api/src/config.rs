//! Configuration management for the API server
//!
//! Settings come from environment variables; a `.env` file is loaded first
//! when present.
//!
//! # Environment Variables
//!
//! - `HOST` / `PORT`: bind address (default: 0.0.0.0:3001)
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
//! - `JWKS_URI`: IdP key set (default: http://localhost:8080/.well-known/jwks.json)
//! - `JWT_ISSUER` / `JWT_AUDIENCE`: optional claim checks
//! - `IDP_API_URL`: IdP admin API base URL
//! - `FRONTEND_URL`: allowed CORS origin, `*` for any (default: http://localhost:3000)
//! - `APP_ENV`: `production` enables HSTS and JSON logs (default: development)
//! - `RATE_LIMIT_MAX` / `RATE_LIMIT_WINDOW_SECS`: per-client budget (default: 100 / 900)
//! - `SYNC_USERS_ON_REQUEST`: mirror the caller into `users` on each request (default: true)
//!
//! # Example
//!
//! ```no_run
//! use taskboard_api::config::Config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Server will listen on {}", config.bind_address());
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub idp: IdpConfig,
    pub rate_limit: RateLimitConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origin; `*` allows any
    pub frontend_url: String,

    /// Deployment environment name
    pub environment: String,
}

impl ApiConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Token verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwks_uri: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,

    /// Upsert the caller into the local `users` table after authentication
    pub sync_users_on_request: bool,
}

/// Identity provider admin API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpConfig {
    /// Base URL; admin endpoints that need the IdP fail with a 500 when unset
    pub api_url: Option<String>,
}

/// Per-client request budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or a numeric/boolean
    /// variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let database_url =
            var("DATABASE_URL").ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        Ok(Self {
            api: ApiConfig {
                host: or("HOST", "0.0.0.0"),
                port: parse(&or("PORT", "3001"), "PORT")?,
                frontend_url: or("FRONTEND_URL", "http://localhost:3000"),
                environment: or("APP_ENV", "development"),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse(&or("DATABASE_MAX_CONNECTIONS", "10"), "DATABASE_MAX_CONNECTIONS")?,
            },
            auth: AuthConfig {
                jwks_uri: or("JWKS_URI", "http://localhost:8080/.well-known/jwks.json"),
                issuer: var("JWT_ISSUER"),
                audience: var("JWT_AUDIENCE"),
                sync_users_on_request: parse(&or("SYNC_USERS_ON_REQUEST", "true"), "SYNC_USERS_ON_REQUEST")?,
            },
            idp: IdpConfig {
                api_url: var("IDP_API_URL"),
            },
            rate_limit: RateLimitConfig {
                max_requests: parse(&or("RATE_LIMIT_MAX", "100"), "RATE_LIMIT_MAX")?,
                window_secs: parse(&or("RATE_LIMIT_WINDOW_SECS", "900"), "RATE_LIMIT_WINDOW_SECS")?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse<T>(value: &str, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgresql://localhost/taskboard")]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.auth.jwks_uri, "http://localhost:8080/.well-known/jwks.json");
        assert!(config.auth.issuer.is_none());
        assert!(config.auth.sync_users_on_request);
        assert!(config.idp.api_url.is_none());
        assert_eq!(config.api.frontend_url, "http://localhost:3000");
        assert!(!config.api.is_production());
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_secs, 900);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://db/taskboard"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8081"),
            ("IDP_API_URL", "http://idp:8080"),
            ("JWT_ISSUER", "http://idp:8080"),
            ("APP_ENV", "Production"),
            ("SYNC_USERS_ON_REQUEST", "false"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:8081");
        assert_eq!(config.idp.api_url.as_deref(), Some("http://idp:8080"));
        assert_eq!(config.auth.issuer.as_deref(), Some("http://idp:8080"));
        assert!(config.api.is_production());
        assert!(!config.auth.sync_users_on_request);
    }

    #[test]
    fn test_missing_database_url() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DATABASE_URL", "  ")]).is_err());
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&[("DATABASE_URL", "postgresql://db/x"), ("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
