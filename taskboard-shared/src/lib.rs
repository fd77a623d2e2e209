//! # Taskboard Shared Library
//!
//! Types, persistence and authentication shared by the Taskboard API server
//! and its HTTP client.
//!
//! ## Module Organization
//!
//! - `models`: Database models, scoped queries and wire shapes
//! - `auth`: JWKS-backed token verification, role normalisation and role gates
//! - `db`: Connection pool and migrations
//! - `idp`: Client for the identity provider's admin API

pub mod auth;
pub mod db;
pub mod idp;
pub mod models;

/// Current version of the Taskboard shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
