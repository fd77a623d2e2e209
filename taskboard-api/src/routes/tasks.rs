//! Task endpoints
//!
//! Visibility follows the caller's role: admins see every task, managers
//! the tasks of projects they manage, users the tasks assigned to them.
//! Anything outside that scope answers 404.
//!
//! # Endpoints
//!
//! - `GET    /api/tasks`
//! - `GET    /api/tasks/:id`
//! - `PUT    /api/tasks/:id/status`       (any role)
//! - `PUT    /api/tasks/:id/assign`       (MANAGER, ADMIN)
//! - `DELETE /api/tasks/:id`              (MANAGER, ADMIN)
//! - `POST   /api/tasks/projects/:id/tasks` (MANAGER, ADMIN; same as `POST /api/projects/:id/tasks`)

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
    extract::{AppJson, AppPath},
    response::{ApiResponse, Created},
    routes::required_text,
};
use axum::{
    extract::State,
    routing::{get, post, put},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use taskboard_shared::{
    auth::{
        authorization::{require_manager_or_admin, require_role},
        middleware::AuthContext,
    },
    models::{
        project::Project,
        task::{NewTask, Task, TaskStatus, TaskWithRelations},
        user::{Role, User},
        Visibility,
    },
};
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks))
        .route("/:id", get(get_task).delete(delete_task))
        .route("/:id/status", put(update_status))
        .route("/:id/assign", put(assign_task))
        .route("/projects/:project_id/tasks", post(create_task))
}

/// Create task request
#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[validate(length(max = 255, message = "Task title must be at most 255 characters"))]
    pub title: Option<String>,

    #[serde(default)]
    pub assignee_id: Option<i32>,
}

/// Status change request
#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

/// Reassignment request; a missing or null `assigneeId` unassigns
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTaskRequest {
    #[serde(default)]
    pub assignee_id: Option<i32>,
}

/// Checks that `assignee_id` names an existing USER
///
/// # Errors
///
/// - 400 Bad Request: unknown user, or a user holding MANAGER/ADMIN
pub(crate) async fn ensure_assignable(db: &PgPool, assignee_id: i32) -> ApiResult<()> {
    let assignee = User::find_by_id(db, assignee_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Assigned user not found".to_string()))?;

    if assignee.role != Role::User {
        return Err(ApiError::BadRequest(
            "Tasks can only be assigned to users with the USER role".to_string(),
        ));
    }

    Ok(())
}

/// List tasks visible to the caller
///
/// Endpoint: GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Vec<TaskWithRelations>>> {
    let tasks = Task::list(&state.db, Visibility::for_context(&ctx)).await?;

    Ok(ApiResponse::ok(tasks))
}

/// Get one task
///
/// Endpoint: GET /api/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppPath(id): AppPath<i32>,
) -> ApiResult<ApiResponse<TaskWithRelations>> {
    let task = Task::find(&state.db, id, Visibility::for_context(&ctx))
        .await?
        .ok_or_else(|| {
            ApiError::NotFound("Task not found or you do not have access to it".to_string())
        })?;

    Ok(ApiResponse::ok(task))
}

/// Create a task in a project
///
/// Endpoint: POST /api/projects/:id/tasks
///
/// # Errors
///
/// - 403 Forbidden: caller is a USER
/// - 400 Bad Request: blank title, unknown or non-USER assignee
/// - 404 Not Found: project missing, or managed by someone else
pub async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppPath(project_id): AppPath<i32>,
    AppJson(req): AppJson<CreateTaskRequest>,
) -> ApiResult<Created<TaskWithRelations>> {
    require_manager_or_admin(&ctx)?;
    validate_request(&req)?;

    let title = required_text(req.title.as_deref(), "Task title is required")?;

    Project::find_row(&state.db, project_id, Visibility::for_context(&ctx))
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(
                "Project not found or you do not have permission to add tasks to it".to_string(),
            )
        })?;

    if let Some(assignee_id) = req.assignee_id {
        ensure_assignable(&state.db, assignee_id).await?;
    }

    let task = Task::create(
        &state.db,
        &NewTask {
            title,
            project_id,
            assignee_id: req.assignee_id,
        },
    )
    .await?;

    tracing::info!(task_id = task.id, project_id, "Task created");

    let task = load(&state.db, task.id).await?;

    Ok(Created(ApiResponse::with_message(
        task,
        "Task created successfully",
    )))
}

/// Change a task's status
///
/// Endpoint: PUT /api/tasks/:id/status
///
/// # Errors
///
/// - 400 Bad Request: status is not TODO, IN_PROGRESS or DONE
/// - 404 Not Found: task missing or outside the caller's scope
pub async fn update_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppPath(id): AppPath<i32>,
    AppJson(req): AppJson<UpdateStatusRequest>,
) -> ApiResult<ApiResponse<TaskWithRelations>> {
    require_role(&ctx, &Role::ALL)?;

    let status: TaskStatus = req
        .status
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            ApiError::BadRequest("Valid status (TODO, IN_PROGRESS, DONE) is required".to_string())
        })?;

    let not_found = || {
        ApiError::NotFound("Task not found or you do not have permission to update it".to_string())
    };

    Task::find(&state.db, id, Visibility::for_context(&ctx))
        .await?
        .ok_or_else(not_found)?;

    Task::update_status(&state.db, id, status)
        .await?
        .ok_or_else(not_found)?;

    let task = load(&state.db, id).await?;

    Ok(ApiResponse::with_message(
        task,
        "Task status updated successfully",
    ))
}

/// Assign a task to a user, or unassign it
///
/// Endpoint: PUT /api/tasks/:id/assign
///
/// # Errors
///
/// - 403 Forbidden: caller is a USER
/// - 404 Not Found: task missing, or in a project managed by someone else
/// - 400 Bad Request: unknown or non-USER assignee
pub async fn assign_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppPath(id): AppPath<i32>,
    AppJson(req): AppJson<AssignTaskRequest>,
) -> ApiResult<ApiResponse<TaskWithRelations>> {
    require_manager_or_admin(&ctx)?;

    let not_found = || {
        ApiError::NotFound(
            "Task not found or you do not have permission to reassign it".to_string(),
        )
    };

    Task::find(&state.db, id, Visibility::for_context(&ctx))
        .await?
        .ok_or_else(not_found)?;

    if let Some(assignee_id) = req.assignee_id {
        ensure_assignable(&state.db, assignee_id).await?;
    }

    Task::update_assignee(&state.db, id, req.assignee_id)
        .await?
        .ok_or_else(not_found)?;

    let task = load(&state.db, id).await?;

    Ok(ApiResponse::with_message(
        task,
        "Task assignment updated successfully",
    ))
}

/// Delete a task
///
/// Endpoint: DELETE /api/tasks/:id
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AppPath(id): AppPath<i32>,
) -> ApiResult<ApiResponse<()>> {
    require_manager_or_admin(&ctx)?;

    let not_found = || {
        ApiError::NotFound("Task not found or you do not have permission to delete it".to_string())
    };

    Task::find(&state.db, id, Visibility::for_context(&ctx))
        .await?
        .ok_or_else(not_found)?;

    if !Task::delete(&state.db, id).await? {
        return Err(not_found());
    }

    tracing::info!(task_id = id, user_id = ctx.user_id, "Task deleted");

    Ok(ApiResponse::message("Task deleted successfully"))
}

async fn load(db: &PgPool, id: i32) -> ApiResult<TaskWithRelations> {
    Task::find(db, id, Visibility::All)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assign_request_null_unassigns() {
        let req: AssignTaskRequest = serde_json::from_value(json!({ "assigneeId": null })).unwrap();
        assert_eq!(req.assignee_id, None);

        let req: AssignTaskRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.assignee_id, None);

        let req: AssignTaskRequest = serde_json::from_value(json!({ "assigneeId": 12 })).unwrap();
        assert_eq!(req.assignee_id, Some(12));
    }

    #[test]
    fn test_create_request_camel_case() {
        let req: CreateTaskRequest =
            serde_json::from_value(json!({ "title": "Write docs", "assigneeId": 3 })).unwrap();
        assert_eq!(req.title.as_deref(), Some("Write docs"));
        assert_eq!(req.assignee_id, Some(3));
    }
}
