//! Verification of identity-provider access tokens
//!
//! Tokens are RS256-signed by the IdP. The signing key is looked up in the
//! [`JwksCache`] by the header's `kid`, then signature, expiry, not-before
//! and (when configured) issuer and audience are checked.
//!
//! # Claims
//!
//! - `sub`: the user's email
//! - `userId`: local user id (number, or a numeric string)
//! - `role` / `roles` / `authorities` / `scopes` / `scope`: role information
//!   in whatever shape the IdP emits; see [`super::roles`]
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::auth::jwks::JwksCache;
//! use taskboard_shared::auth::jwt::{verify_token, VerifyOptions};
//!
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let keys = JwksCache::new("http://localhost:8080/.well-known/jwks.json", reqwest::Client::new());
//! let claims = verify_token(token, &keys, &VerifyOptions::default()).await?;
//! println!("{} ({:?})", claims.sub, claims.user_id());
//! # Ok(())
//! # }
//! ```

use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::jwks::{JwksCache, JwksError};

/// Error type for token verification
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid issuer")]
    InvalidIssuer,

    #[error("Invalid audience")]
    InvalidAudience,

    #[error("Invalid signature")]
    InvalidSignature,

    /// Not a well-formed JWT
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Header algorithm is not in the allowed list
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The token's `kid` is not in the key set
    #[error("Unknown signing key: {0:?}")]
    UnknownKey(Option<String>),

    /// Any other claim check failure
    #[error("Token validation failed: {0}")]
    Validation(String),

    /// The key set could not be loaded
    #[error(transparent)]
    KeySource(JwksError),
}

impl From<JwksError> for JwtError {
    fn from(err: JwksError) -> Self {
        match err {
            JwksError::UnknownKey(kid) => JwtError::UnknownKey(kid),
            other => JwtError::KeySource(other),
        }
    }
}

/// Claims carried by IdP access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpClaims {
    /// Subject, the user's email
    pub sub: String,

    /// Raw `userId` claim; use [`IdpClaims::user_id`]
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id_claim: Option<Value>,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Value>,
}

impl IdpClaims {
    /// Local user id, if the claim is present and numeric
    pub fn user_id(&self) -> Option<i32> {
        match self.user_id_claim.as_ref()? {
            Value::Number(n) => n.as_i64().and_then(|id| i32::try_from(id).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Verification settings
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Accepted signing algorithms
    pub algorithms: Vec<Algorithm>,

    /// Required `iss`, if any
    pub issuer: Option<String>,

    /// Required `aud`, if any; when unset the audience is not checked
    pub audience: Option<String>,

    /// Clock skew tolerance in seconds
    pub leeway: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::RS256],
            issuer: None,
            audience: None,
            leeway: 60,
        }
    }
}

/// Verifies `token` and returns its claims
///
/// # Errors
///
/// Returns an error if the token is malformed, signed with an unknown key or
/// disallowed algorithm, expired, not yet valid, or fails the issuer/audience
/// checks.
pub async fn verify_token(
    token: &str,
    keys: &JwksCache,
    options: &VerifyOptions,
) -> Result<IdpClaims, JwtError> {
    let header = decode_header(token).map_err(|e| JwtError::Malformed(e.to_string()))?;

    if !options.algorithms.contains(&header.alg) {
        return Err(JwtError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
    }

    let key = keys.decoding_key(header.kid.as_deref()).await?;

    let mut validation = Validation::new(header.alg);
    validation.leeway = options.leeway;
    validation.validate_exp = true;
    validation.validate_nbf = true;

    if let Some(issuer) = &options.issuer {
        validation.set_issuer(&[issuer]);
    }

    match &options.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<IdpClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => JwtError::Expired,
        ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
        ErrorKind::InvalidAudience => JwtError::InvalidAudience,
        ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            JwtError::Malformed(e.to_string())
        }
        _ => JwtError::Validation(e.to_string()),
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const TEST_JWKS: &str = include_str!("../../tests/fixtures/test_jwks.json");
    const TEST_KEY: &[u8] = include_bytes!("../../tests/fixtures/test_rsa_private.pem");
    const OTHER_KEY: &[u8] = include_bytes!("../../tests/fixtures/other_rsa_private.pem");
    const KID: &str = "taskboard-test-key";

    fn sign(claims: &Value, pem: &[u8], kid: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
    }

    fn claims(exp_offset: i64) -> Value {
        json!({
            "sub": "dev@example.com",
            "userId": 42,
            "role": "ROLE_MANAGER",
            "iss": "https://idp.example.com",
            "aud": "taskboard",
            "exp": Utc::now().timestamp() + exp_offset,
        })
    }

    fn keys() -> JwksCache {
        JwksCache::from_json(TEST_JWKS).unwrap()
    }

    #[tokio::test]
    async fn test_verify_valid_token() {
        let token = sign(&claims(3600), TEST_KEY, Some(KID));
        let verified = verify_token(&token, &keys(), &VerifyOptions::default())
            .await
            .unwrap();

        assert_eq!(verified.sub, "dev@example.com");
        assert_eq!(verified.user_id(), Some(42));
        assert_eq!(verified.role, Some(json!("ROLE_MANAGER")));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let token = sign(&claims(-3600), TEST_KEY, Some(KID));
        let result = verify_token(&token, &keys(), &VerifyOptions::default()).await;
        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[tokio::test]
    async fn test_wrong_signing_key() {
        let token = sign(&claims(3600), OTHER_KEY, Some(KID));
        let result = verify_token(&token, &keys(), &VerifyOptions::default()).await;
        assert!(matches!(result, Err(JwtError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_unknown_kid() {
        let token = sign(&claims(3600), TEST_KEY, Some("other"));
        let result = verify_token(&token, &keys(), &VerifyOptions::default()).await;
        assert!(matches!(result, Err(JwtError::UnknownKey(Some(_)))));
    }

    #[tokio::test]
    async fn test_disallowed_algorithm() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims(3600),
            &EncodingKey::from_secret(b"shared-secret"),
        )
        .unwrap();

        let result = verify_token(&token, &keys(), &VerifyOptions::default()).await;
        assert!(matches!(result, Err(JwtError::UnsupportedAlgorithm(_))));
    }

    #[tokio::test]
    async fn test_malformed_token() {
        let result = verify_token("not-a-jwt", &keys(), &VerifyOptions::default()).await;
        assert!(matches!(result, Err(JwtError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_issuer_and_audience_checks() {
        let token = sign(&claims(3600), TEST_KEY, Some(KID));

        let matching = VerifyOptions {
            issuer: Some("https://idp.example.com".to_string()),
            audience: Some("taskboard".to_string()),
            ..Default::default()
        };
        assert!(verify_token(&token, &keys(), &matching).await.is_ok());

        let wrong_issuer = VerifyOptions {
            issuer: Some("https://elsewhere.example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            verify_token(&token, &keys(), &wrong_issuer).await,
            Err(JwtError::InvalidIssuer)
        ));

        let wrong_audience = VerifyOptions {
            audience: Some("billing".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            verify_token(&token, &keys(), &wrong_audience).await,
            Err(JwtError::InvalidAudience)
        ));
    }

    #[test]
    fn test_user_id_claim_forms() {
        let parse = |value: Value| -> IdpClaims {
            serde_json::from_value(json!({ "sub": "a@b.c", "exp": 0, "userId": value })).unwrap()
        };

        assert_eq!(parse(json!(7)).user_id(), Some(7));
        assert_eq!(parse(json!("12")).user_id(), Some(12));
        assert_eq!(parse(json!("abc")).user_id(), None);
        assert_eq!(parse(json!(1.5)).user_id(), None);

        let missing: IdpClaims = serde_json::from_value(json!({ "sub": "a@b.c", "exp": 0 })).unwrap();
        assert_eq!(missing.user_id(), None);
    }
}
