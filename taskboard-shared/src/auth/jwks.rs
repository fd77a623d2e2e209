//! JSON Web Key Set cache
//!
//! Access tokens are signed by the identity provider; the public keys come
//! from its JWKS endpoint. Keys are fetched lazily and cached for
//! [`CACHE_TTL`]. A token whose `kid` is not in the cached set triggers a
//! refetch, bounded to [`MAX_FETCHES_PER_MINUTE`] so forged key ids cannot
//! be used to hammer the IdP.
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::auth::jwks::JwksCache;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let keys = JwksCache::new(
//!     "http://localhost:8080/.well-known/jwks.json",
//!     reqwest::Client::new(),
//! );
//! let key = keys.decoding_key(Some("key-1")).await?;
//! # Ok(())
//! # }
//! ```

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long a fetched key set is trusted
pub const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Upper bound on JWKS requests in any sliding minute
pub const MAX_FETCHES_PER_MINUTE: usize = 5;

const FETCH_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    #[error("Failed to fetch JWKS: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Invalid JWKS document: {0}")]
    InvalidKeySet(String),

    /// No key matches the token's `kid`
    #[error("No signing key found for kid {0:?}")]
    UnknownKey(Option<String>),

    #[error("JWKS refetch limit reached")]
    RateLimited,

    #[error("Unusable signing key: {0}")]
    InvalidKey(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug)]
enum KeySource {
    Remote { uri: String, http: reqwest::Client },
    Static,
}

#[derive(Debug, Default)]
struct CacheState {
    keys: Option<JwkSet>,
    fetched_at: Option<Instant>,
    fetches: VecDeque<Instant>,
}

impl CacheState {
    fn is_fresh(&self, now: Instant) -> bool {
        self.fetched_at
            .is_some_and(|at| now.saturating_duration_since(at) < CACHE_TTL)
    }

    fn prune_fetches(&mut self, now: Instant) {
        while let Some(oldest) = self.fetches.front() {
            if now.saturating_duration_since(*oldest) >= FETCH_WINDOW {
                self.fetches.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Resolves token `kid`s to decoding keys
#[derive(Debug)]
pub struct JwksCache {
    source: KeySource,
    state: RwLock<CacheState>,
}

impl JwksCache {
    /// Cache backed by a remote JWKS endpoint
    pub fn new(uri: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            source: KeySource::Remote {
                uri: uri.into(),
                http,
            },
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Fixed key set that never touches the network
    pub fn from_key_set(keys: JwkSet) -> Self {
        Self {
            source: KeySource::Static,
            state: RwLock::new(CacheState {
                keys: Some(keys),
                ..Default::default()
            }),
        }
    }

    /// Parses a JWKS JSON document into a fixed key set
    pub fn from_json(json: &str) -> Result<Self, JwksError> {
        let keys: JwkSet =
            serde_json::from_str(json).map_err(|e| JwksError::InvalidKeySet(e.to_string()))?;
        Ok(Self::from_key_set(keys))
    }

    /// Returns the decoding key for `kid`
    ///
    /// A token without `kid` is accepted only when the set holds exactly
    /// one key.
    ///
    /// # Errors
    ///
    /// - [`JwksError::UnknownKey`] if no key matches, even after a refetch
    /// - [`JwksError::RateLimited`] if a refetch is needed but the budget is spent
    /// - [`JwksError::Fetch`] if the endpoint cannot be reached
    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, JwksError> {
        let uri_and_client = match &self.source {
            KeySource::Static => {
                let state = self.state.read().await;
                return lookup(state.keys.as_ref(), kid);
            }
            KeySource::Remote { uri, http } => (uri, http),
        };

        {
            let state = self.state.read().await;
            if state.is_fresh(Instant::now()) {
                if let Ok(key) = lookup(state.keys.as_ref(), kid) {
                    return Ok(key);
                }
            }
        }

        let mut state = self.state.write().await;
        let now = Instant::now();

        // Another request may have refreshed the set while we waited
        if state.is_fresh(now) {
            if let Ok(key) = lookup(state.keys.as_ref(), kid) {
                return Ok(key);
            }
        }

        state.prune_fetches(now);
        if state.fetches.len() >= MAX_FETCHES_PER_MINUTE {
            warn!(kid = ?kid, "JWKS refetch limit reached, using cached keys");
            return match lookup(state.keys.as_ref(), kid) {
                Ok(key) => Ok(key),
                Err(_) => Err(JwksError::RateLimited),
            };
        }

        let (uri, http) = uri_and_client;
        state.fetches.push_back(now);
        let keys = fetch_key_set(http, uri).await?;
        info!(keys = keys.keys.len(), "Fetched JWKS");

        state.keys = Some(keys);
        state.fetched_at = Some(Instant::now());

        lookup(state.keys.as_ref(), kid)
    }
}

async fn fetch_key_set(http: &reqwest::Client, uri: &str) -> Result<JwkSet, JwksError> {
    debug!(uri, "Fetching JWKS");

    let keys = http
        .get(uri)
        .send()
        .await?
        .error_for_status()?
        .json::<JwkSet>()
        .await?;

    Ok(keys)
}

fn lookup(keys: Option<&JwkSet>, kid: Option<&str>) -> Result<DecodingKey, JwksError> {
    let unknown = || JwksError::UnknownKey(kid.map(str::to_string));

    let keys = keys.ok_or_else(unknown)?;
    let jwk = match kid {
        Some(kid) => keys.find(kid),
        // Without a kid the key is only unambiguous in a single-key set
        None => match keys.keys.as_slice() {
            [only] => Some(only),
            _ => None,
        },
    }
    .ok_or_else(unknown)?;

    Ok(DecodingKey::from_jwk(jwk)?)
}
