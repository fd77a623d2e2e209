//! Application state and router builder
//!
//! This module defines the shared application state and provides
//! a function to build the Axum router with all routes and middleware.
//!
//! # Example
//!
//! ```no_run
//! use taskboard_api::{app::AppState, config::Config};
//! use sqlx::PgPool;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let pool = PgPool::connect(&config.database.url).await?;
//! let state = AppState::new(pool, config)?;
//! let app = taskboard_api::app::build_router(state);
//! # Ok(())
//! # }
//! ```

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    middleware::{logging::request_logger, rate_limit::RateLimiter, security::SecurityHeadersLayer},
};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::get,
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use taskboard_shared::{
    auth::{
        jwks::JwksCache,
        jwt::VerifyOptions,
        middleware::{extract_token, AccessToken, AuthContext, AuthError, TokenVerifier},
    },
    idp::IdpClient,
    models::user::{UpsertUser, User},
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Request bodies above this size are rejected with 413
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

const JWKS_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// JWKS-backed access token verification
    pub verifier: TokenVerifier,

    /// IdP admin API; `None` when `IDP_API_URL` is unset
    pub idp: Option<IdpClient>,

    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Creates state that fetches signing keys from `config.auth.jwks_uri`
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(JWKS_TIMEOUT).build()?;
        let keys = JwksCache::new(config.auth.jwks_uri.clone(), http);

        Self::with_keys(db, config, keys)
    }

    /// Creates state around an existing key source
    pub fn with_keys(db: PgPool, config: Config, keys: JwksCache) -> anyhow::Result<Self> {
        let options = VerifyOptions {
            issuer: config.auth.issuer.clone(),
            audience: config.auth.audience.clone(),
            ..VerifyOptions::default()
        };

        let idp = config
            .idp
            .api_url
            .as_deref()
            .map(IdpClient::new)
            .transpose()?;

        Ok(Self {
            db,
            verifier: TokenVerifier::new(Arc::new(keys), options),
            idp,
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            config: Arc::new(config),
        })
    }

    /// IdP client, or a configuration error when none is configured
    pub fn idp(&self) -> ApiResult<&IdpClient> {
        self.idp.as_ref().ok_or_else(|| {
            ApiError::Configuration("IDP_API_URL environment variable is not set".to_string())
        })
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                        # Health check (public)
/// └── /api/                          # JWT required
///     ├── /projects                  # GET, POST
///     │   ├── /:id                   # GET, PUT, DELETE
///     │   └── /:id/tasks             # POST (create task)
///     ├── /tasks                     # GET
///     │   ├── /:id                   # GET, DELETE
///     │   ├── /:id/status            # PUT
///     │   └── /:id/assign            # PUT
///     └── /admin                     # ADMIN only
///         ├── /users                 # GET (paginated)
///         ├── /users/:userId         # GET
///         ├── /users/:userId/role    # PUT (forwarded to the IdP)
///         ├── /stats                 # GET
///         ├── /dashboard-stats       # GET
///         └── /sync-users            # GET, POST
/// ```
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. Tracing spans (tower-http TraceLayer)
/// 2. Security headers
/// 3. Access log line
/// 4. Rate limiting
/// 5. CORS
/// 6. Body size limit
/// 7. Authentication (API routes only)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let api_routes = Router::new()
        .nest("/api/projects", routes::projects::router())
        .nest("/api/tasks", routes::tasks::router())
        .nest("/api/admin", routes::admin::router())
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let cors = cors_layer(&state.config.api.frontend_url);
    let production = state.config.api.is_production();

    Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::rate_limit_layer,
        ))
        .layer(from_fn(request_logger))
        .layer(SecurityHeadersLayer::new(production))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state)
}

/// CORS for the configured front-end origin(s); `*` is permissive
fn cors_layer(frontend_url: &str) -> CorsLayer {
    if frontend_url.trim() == "*" {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = frontend_url
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("The requested resource was not found".to_string())
}

/// JWT authentication middleware layer
///
/// Verifies the bearer token (header or `?token=`) against the IdP key set,
/// mirrors the caller into `users` when enabled, and injects [`AuthContext`]
/// and [`AccessToken`] into request extensions. The context is also copied
/// onto the response for the access log.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(req.headers(), req.uri()).ok_or(AuthError::MissingCredentials)?;

    let ctx = state.verifier.verify(&token).await.map_err(|err| {
        tracing::debug!(error = %err, "Rejected access token");
        err
    })?;

    if state.config.auth.sync_users_on_request {
        sync_caller(&state.db, &ctx).await;
    }

    req.extensions_mut().insert(ctx.clone());
    req.extensions_mut().insert(AccessToken(token));

    let mut response = next.run(req).await;
    response.extensions_mut().insert(ctx);

    Ok(response)
}

/// Upserts the caller; failures never block the request
async fn sync_caller(db: &PgPool, ctx: &AuthContext) {
    let data = UpsertUser {
        id: ctx.user_id,
        email: ctx.email.clone(),
        role: ctx.role,
        email_verified: true,
        created_at: None,
    };

    if let Err(err) = User::upsert(db, &data).await {
        tracing::warn!(user_id = ctx.user_id, error = %err, "Failed to sync user to local database");
    }
}
