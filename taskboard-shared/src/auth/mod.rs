//! Authentication and authorization
//!
//! Access tokens are issued by an external identity provider and verified
//! here against its published key set.
//!
//! # Modules
//!
//! - [`jwks`]: cached, rate-limited JWKS key lookup
//! - [`jwt`]: signature and claim verification
//! - [`roles`]: mapping IdP role claims onto USER / MANAGER / ADMIN
//! - [`middleware`]: token extraction and the authenticated [`middleware::AuthContext`]
//! - [`authorization`]: role gates
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskboard_shared::auth::jwks::JwksCache;
//! use taskboard_shared::auth::jwt::VerifyOptions;
//! use taskboard_shared::auth::middleware::TokenVerifier;
//! use taskboard_shared::auth::authorization::require_admin;
//!
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let keys = JwksCache::new("http://localhost:8080/.well-known/jwks.json", reqwest::Client::new());
//! let verifier = TokenVerifier::new(Arc::new(keys), VerifyOptions::default());
//!
//! let ctx = verifier.verify(token).await?;
//! require_admin(&ctx)?;
//! # Ok(())
//! # }
//! ```

pub mod authorization;
pub mod jwks;
pub mod jwt;
pub mod middleware;
pub mod roles;
