//! Project endpoints
//!
//! Reads are open to every role and scoped by [`Visibility`]: admins see
//! everything, managers their own projects, users the projects holding a
//! task assigned to them (with only those tasks listed). Writes require
//! MANAGER or ADMIN, and managers may only touch their own projects.
//!
//! # Endpoints
//!
//! - `GET    /api/projects`
//! - `POST   /api/projects`
//! - `GET    /api/projects/:id`
//! - `PUT    /api/projects/:id`
//! - `DELETE /api/projects/:id`
//! - `POST   /api/projects/:id/tasks`

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
    extract::{AppJson, AppPath},
    response::{ApiResponse, Created},
    routes::{optional_text, required_text, tasks::create_task},
};
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use taskboard_shared::{
    auth::{authorization::require_manager_or_admin, middleware::AuthContext},
    models::{
        project::{Project, ProjectWithRelations},
        Visibility,
    },
};
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/:id/tasks", post(create_task))
}

/// Create project request
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(max = 255, message = "Project name must be at most 255 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
}

/// Update project request; blank or missing fields keep their value
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(max = 255, message = "Project name must be at most 255 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
}

/// List projects visible to the caller
///
/// Endpoint: GET /api/projects
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Vec<ProjectWithRelations>>> {
    let projects = Project::list(&state.db, Visibility::for_context(&ctx)).await?;

    Ok(ApiResponse::ok(projects))
}

/// Get one project
///
/// Endpoint: GET /api/projects/:id
///
/// # Errors
///
/// - 404 Not Found: no such project, or not visible to the caller
pub async fn get_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppPath(id): AppPath<i32>,
) -> ApiResult<ApiResponse<ProjectWithRelations>> {
    let project = Project::find(&state.db, id, Visibility::for_context(&ctx))
        .await?
        .ok_or_else(|| {
            ApiError::NotFound("Project not found or you do not have access to it".to_string())
        })?;

    Ok(ApiResponse::ok(project))
}

/// Create a project managed by the caller
///
/// Endpoint: POST /api/projects
///
/// # Errors
///
/// - 403 Forbidden: caller is a USER
/// - 400 Bad Request: missing or blank name
pub async fn create_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppJson(req): AppJson<CreateProjectRequest>,
) -> ApiResult<Created<ProjectWithRelations>> {
    require_manager_or_admin(&ctx)?;
    validate_request(&req)?;

    let name = required_text(req.name.as_deref(), "Project name is required")?;
    let description = optional_text(req.description.as_deref());

    let project = Project::create(&state.db, &name, description.as_deref(), ctx.user_id).await?;

    tracing::info!(
        project_id = project.id,
        manager_id = ctx.user_id,
        "Project created"
    );

    let project = load(&state, project.id).await?;

    Ok(Created(ApiResponse::with_message(
        project,
        "Project created successfully",
    )))
}

/// Update a project's name and/or description
///
/// Endpoint: PUT /api/projects/:id
///
/// # Errors
///
/// - 403 Forbidden: caller is a USER
/// - 404 Not Found: no such project, or a manager who does not own it
pub async fn update_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppPath(id): AppPath<i32>,
    AppJson(req): AppJson<UpdateProjectRequest>,
) -> ApiResult<ApiResponse<ProjectWithRelations>> {
    require_manager_or_admin(&ctx)?;
    validate_request(&req)?;

    Project::find_row(&state.db, id, Visibility::for_context(&ctx))
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(
                "Project not found or you do not have permission to update it".to_string(),
            )
        })?;

    let name = optional_text(req.name.as_deref());
    let description = optional_text(req.description.as_deref());

    Project::update(&state.db, id, name.as_deref(), description.as_deref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    let project = load(&state, id).await?;

    Ok(ApiResponse::with_message(
        project,
        "Project updated successfully",
    ))
}

/// Delete a project and its tasks
///
/// Endpoint: DELETE /api/projects/:id
///
/// # Errors
///
/// - 403 Forbidden: caller is a USER
/// - 404 Not Found: no such project, or a manager who does not own it
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppPath(id): AppPath<i32>,
) -> ApiResult<ApiResponse<()>> {
    require_manager_or_admin(&ctx)?;

    let not_found = || {
        ApiError::NotFound("Project not found or you do not have permission to delete it".to_string())
    };

    Project::find_row(&state.db, id, Visibility::for_context(&ctx))
        .await?
        .ok_or_else(not_found)?;

    if !Project::delete(&state.db, id).await? {
        return Err(not_found());
    }

    tracing::info!(project_id = id, user_id = ctx.user_id, "Project deleted");

    Ok(ApiResponse::message("Project deleted successfully"))
}

async fn load(state: &AppState, id: i32) -> ApiResult<ProjectWithRelations> {
    Project::find(&state.db, id, Visibility::All)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))
}
