//! Administration endpoints (ADMIN only)
//!
//! User roles are owned by the identity provider, so role changes and the
//! user mirror sync call the IdP with the caller's own bearer token. An
//! unset `IDP_API_URL` makes those endpoints answer 500.
//!
//! # Endpoints
//!
//! - `GET      /api/admin/users?page&limit&search&role`
//! - `GET      /api/admin/users/:userId`
//! - `PUT      /api/admin/users/:userId/role`
//! - `GET      /api/admin/stats`
//! - `GET      /api/admin/dashboard-stats`
//! - `GET|POST /api/admin/sync-users`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{AppJson, AppPath, AppQuery},
    response::ApiResponse,
};
use axum::{
    extract::State,
    routing::{get, put},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use taskboard_shared::{
    auth::{
        authorization::require_admin,
        middleware::{AccessToken, AuthContext},
    },
    idp::{IdpError, IdpUser, SyncSummary},
    models::{
        stats::AdminStats,
        user::{Pagination, Role, User, UserDetails, UserFilter, UserPage},
    },
};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// Highest page whose offset fits in an `i64`
const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:user_id", get(get_user))
        .route("/users/:user_id/role", put(update_user_role))
        .route("/stats", get(stats))
        .route("/dashboard-stats", get(dashboard_stats))
        .route("/sync-users", get(sync_users).post(sync_users))
}

/// Query parameters for the user listing
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,

    /// Case-insensitive; unknown values are ignored
    pub role: Option<String>,
}

impl ListUsersQuery {
    /// `(page, limit)` with defaults applied, limit clamped to 1..=100 and
    /// page to 1..=[`MAX_PAGE`]
    fn page_and_limit(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }

    fn filter(&self) -> UserFilter {
        UserFilter {
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            role: self
                .role
                .as_deref()
                .and_then(|r| r.trim().to_uppercase().parse::<Role>().ok()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateRoleRequest {
    pub role: Option<String>,
}

/// Paginated user listing
///
/// Endpoint: GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppQuery(query): AppQuery<ListUsersQuery>,
) -> ApiResult<ApiResponse<UserPage>> {
    require_admin(&ctx)?;

    let (page, limit) = query.page_and_limit();
    let filter = query.filter();

    let users = User::list(&state.db, &filter, limit, (page - 1) * limit).await?;
    let total = User::count_filtered(&state.db, &filter).await?;

    Ok(ApiResponse::ok(UserPage {
        users,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// User details with owned projects and assigned tasks
///
/// Endpoint: GET /api/admin/users/:userId
pub async fn get_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppPath(user_id): AppPath<i32>,
) -> ApiResult<ApiResponse<UserDetails>> {
    require_admin(&ctx)?;

    let user = User::details(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok(user))
}

/// Change a user's role at the IdP and mirror it locally
///
/// Endpoint: PUT /api/admin/users/:userId/role
///
/// # Errors
///
/// - 400 Bad Request: missing/unknown role, or the caller's own id
/// - 500 Internal Server Error: IdP not configured or unreachable
/// - IdP rejections are returned with the IdP's status and message
pub async fn update_user_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Extension(token): Extension<AccessToken>,
    AppPath(user_id): AppPath<i32>,
    AppJson(req): AppJson<UpdateRoleRequest>,
) -> ApiResult<ApiResponse<User>> {
    require_admin(&ctx)?;

    let role: Role = req
        .role
        .as_deref()
        .and_then(|r| r.parse().ok())
        .ok_or_else(|| ApiError::BadRequest("Valid role is required".to_string()))?;

    if user_id == ctx.user_id {
        return Err(ApiError::BadRequest(
            "You cannot change your own role".to_string(),
        ));
    }

    let idp = state.idp()?;
    idp.update_user_role(&token.bearer(), user_id, role).await?;

    let user = User::update_role(&state.db, user_id, role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id, %role, admin_id = ctx.user_id, "User role updated");

    Ok(ApiResponse::with_message(
        user,
        format!("User role successfully updated to {}", role),
    ))
}

/// Dashboard statistics from the local database
///
/// Endpoint: GET /api/admin/stats
pub async fn stats(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<ApiResponse<AdminStats>> {
    require_admin(&ctx)?;

    let stats = AdminStats::collect(&state.db).await?;

    Ok(ApiResponse::ok(stats))
}

/// Dashboard statistics with user figures taken from the IdP
///
/// Endpoint: GET /api/admin/dashboard-stats
pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Extension(token): Extension<AccessToken>,
) -> ApiResult<ApiResponse<AdminStats>> {
    require_admin(&ctx)?;

    let users = fetch_idp_users(&state, &token).await?;
    let stats = AdminStats::collect_with_users(&state.db, users.iter().map(IdpUser::role)).await?;

    Ok(ApiResponse::ok(stats))
}

/// Replace the local user mirror with the IdP's user list
///
/// Endpoint: GET|POST /api/admin/sync-users
///
/// Users missing from the IdP list are deleted and the rest upserted, in
/// one transaction.
pub async fn sync_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Extension(token): Extension<AccessToken>,
) -> ApiResult<ApiResponse<SyncSummary>> {
    require_admin(&ctx)?;

    let users = fetch_idp_users(&state, &token).await?;
    let keep_ids: Vec<i32> = users.iter().map(|u| u.id).collect();

    let mut tx = state.db.begin().await?;

    let deleted = User::delete_except(&mut *tx, &keep_ids).await?;
    if deleted > 0 {
        tracing::info!(deleted, "Sync: removed stale users from local mirror");
    }

    for user in &users {
        User::upsert(&mut *tx, &user.to_upsert()).await?;
    }

    tx.commit().await?;

    tracing::info!(upserted = users.len(), "Sync: users upserted from IdP");

    Ok(ApiResponse::with_message(
        SyncSummary {
            deleted,
            upserted: users.len(),
        },
        "User data synchronized successfully with IdP.",
    ))
}

async fn fetch_idp_users(state: &AppState, token: &AccessToken) -> ApiResult<Vec<IdpUser>> {
    let idp = state.idp()?;

    idp.list_users(&token.bearer()).await.map_err(|err| match err {
        IdpError::Status { status, .. } => ApiError::from(IdpError::Status {
            status,
            message: "Failed to fetch authoritative user list from IdP.".to_string(),
        }),
        other => ApiError::from(other),
    })
}
