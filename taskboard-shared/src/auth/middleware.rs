//! Request authentication primitives for Axum
//!
//! The API's auth layer pulls the token out of the request with
//! [`extract_token`], turns it into an [`AuthContext`] with
//! [`TokenVerifier::verify`], and stores the context (and the raw
//! [`AccessToken`], for forwarding to the IdP) in request extensions.
//!
//! # Token Sources
//!
//! 1. `Authorization: Bearer <token>`
//! 2. `?token=<token>` query parameter
//!
//! # Example
//!
//! ```
//! use axum::Extension;
//! use taskboard_shared::auth::middleware::AuthContext;
//!
//! async fn handler(Extension(auth): Extension<AuthContext>) -> String {
//!     format!("{} is {}", auth.email, auth.role)
//! }
//! ```

use axum::extract::Query;
use axum::http::{header, HeaderMap, Uri};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::jwks::JwksCache;
use super::jwt::{verify_token, JwtError, VerifyOptions};
use super::roles::normalize_role;
use crate::models::user::Role;
use crate::models::Visibility;

/// Authenticated caller, added to request extensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Local user id (`userId` claim)
    pub user_id: i32,

    /// Email (`sub` claim)
    pub email: String,

    /// Normalised role
    pub role: Role,
}

impl AuthContext {
    /// Row scope for this caller
    pub fn visibility(&self) -> Visibility {
        Visibility::for_role(self.role, self.user_id)
    }
}

/// The caller's raw bearer token, forwarded on IdP admin calls
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Error type for request authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token in the header or query string
    #[error("Missing credentials")]
    MissingCredentials,

    /// Token failed verification
    #[error("Invalid or expired token: {0}")]
    InvalidToken(#[from] JwtError),

    /// Token verified but carries no usable `userId`
    #[error("No user information found")]
    MissingUserInfo,
}

/// Finds the access token in the request
///
/// A non-Bearer `Authorization` header falls through to the query string.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let mut parts = v.split(' ');
            match (parts.next(), parts.next()) {
                (Some("Bearer"), Some(token)) if !token.is_empty() => Some(token.to_string()),
                _ => None,
            }
        });

    from_header.or_else(|| {
        let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
        params.get("token").filter(|t| !t.is_empty()).cloned()
    })
}

/// Verifies tokens against the IdP key set and builds [`AuthContext`]s
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: Arc<JwksCache>,
    options: VerifyOptions,
}

impl TokenVerifier {
    pub fn new(keys: Arc<JwksCache>, options: VerifyOptions) -> Self {
        Self { keys, options }
    }

    /// Verifies `token` and normalises its role
    ///
    /// Tokens without a recognisable role get [`Role::User`].
    pub async fn verify(&self, token: &str) -> Result<AuthContext, AuthError> {
        let claims = verify_token(token, &self.keys, &self.options).await?;

        let user_id = claims.user_id().ok_or(AuthError::MissingUserInfo)?;
        let role = normalize_role(&claims).unwrap_or_else(|| {
            debug!(sub = %claims.sub, "No role claim recognised, defaulting to USER");
            Role::User
        });

        Ok(AuthContext {
            user_id,
            email: claims.sub,
            role,
        })
    }
}
