//! Task model and database operations
//!
//! Tasks belong to a project and may be assigned to a USER. Reads are
//! scoped with [`Visibility`]: managers see tasks in the projects they own,
//! users see tasks assigned to them.
//!
//! # Schema
//!
//! ```sql
//! CREATE TYPE task_status AS ENUM ('TODO', 'IN_PROGRESS', 'DONE');
//!
//! CREATE TABLE tasks (
//!     id SERIAL PRIMARY KEY,
//!     title TEXT NOT NULL,
//!     status task_status NOT NULL DEFAULT 'TODO',
//!     project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
//!     assignee_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::fmt;
use std::str::FromStr;

use super::user::UserSummary;
use super::Visibility;

/// Task progress
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "task_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseTaskStatusError(s.to_string()))
    }
}

/// A task row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i32,
    pub title: String,
    pub status: TaskStatus,
    pub project_id: i32,
    pub assignee_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project as embedded in task payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProject {
    pub id: i32,
    pub name: String,
    pub manager: UserSummary,
}

/// A task with its project (and that project's manager) and assignee
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithRelations {
    pub id: i32,
    pub title: String,
    pub status: TaskStatus,
    pub project_id: i32,
    pub assignee_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project: TaskProject,
    pub assignee: Option<UserSummary>,
}

/// Project name as shown in the activity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityProject {
    pub name: String,
}

/// Assignee email as shown in the activity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAssignee {
    pub email: String,
}

/// Recently updated task for the admin dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub id: i32,
    pub title: String,
    pub status: TaskStatus,
    pub project_id: i32,
    pub assignee_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project: ActivityProject,
    pub assignee: Option<ActivityAssignee>,
}

/// Input for [`Task::create`]
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub project_id: i32,
    pub assignee_id: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i32,
    title: String,
    status: TaskStatus,
    project_id: i32,
    assignee_id: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    project_name: String,
    manager_id: i32,
    manager_email: String,
    assignee_email: Option<String>,
}

impl From<TaskRow> for TaskWithRelations {
    fn from(row: TaskRow) -> Self {
        let assignee = row
            .assignee_id
            .zip(row.assignee_email)
            .map(|(id, email)| UserSummary { id, email });

        Self {
            id: row.id,
            title: row.title,
            status: row.status,
            project_id: row.project_id,
            assignee_id: row.assignee_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            project: TaskProject {
                id: row.project_id,
                name: row.project_name,
                manager: UserSummary {
                    id: row.manager_id,
                    email: row.manager_email,
                },
            },
            assignee,
        }
    }
}

impl From<TaskRow> for RecentActivity {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            status: row.status,
            project_id: row.project_id,
            assignee_id: row.assignee_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            project: ActivityProject {
                name: row.project_name,
            },
            assignee: row.assignee_email.map(|email| ActivityAssignee { email }),
        }
    }
}

const TASK_SELECT: &str = r#"
    SELECT t.id, t.title, t.status, t.project_id, t.assignee_id, t.created_at, t.updated_at,
           p.name AS project_name, p.manager_id, m.email AS manager_email,
           a.email AS assignee_email
    FROM tasks t
    JOIN projects p ON p.id = t.project_id
    JOIN users m ON m.id = p.manager_id
    LEFT JOIN users a ON a.id = t.assignee_id
    WHERE TRUE"#;

const TASK_RETURNING: &str = "RETURNING id, title, status, project_id, assignee_id, created_at, updated_at";

fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, visibility: Visibility) {
    match visibility {
        Visibility::All => {}
        Visibility::ManagedBy(user_id) => {
            qb.push(" AND p.manager_id = ").push_bind(user_id);
        }
        Visibility::AssignedTo(user_id) => {
            qb.push(" AND t.assignee_id = ").push_bind(user_id);
        }
    }
}

impl Task {
    /// Lists visible tasks, newest first
    pub async fn list(
        pool: &PgPool,
        visibility: Visibility,
    ) -> Result<Vec<TaskWithRelations>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(TASK_SELECT);
        push_scope(&mut qb, visibility);
        qb.push(" ORDER BY t.created_at DESC");

        let rows: Vec<TaskRow> = qb.build_query_as().fetch_all(pool).await?;

        Ok(rows.into_iter().map(TaskWithRelations::from).collect())
    }

    /// Loads one task if it is visible under `visibility`
    pub async fn find(
        pool: &PgPool,
        id: i32,
        visibility: Visibility,
    ) -> Result<Option<TaskWithRelations>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(TASK_SELECT);
        qb.push(" AND t.id = ").push_bind(id);
        push_scope(&mut qb, visibility);

        let row: Option<TaskRow> = qb.build_query_as().fetch_optional(pool).await?;

        Ok(row.map(TaskWithRelations::from))
    }

    pub async fn create(pool: &PgPool, data: &NewTask) -> Result<Self, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (title, project_id, assignee_id)
            VALUES ($1, $2, $3)
            {TASK_RETURNING}
            "#
        ))
        .bind(&data.title)
        .bind(data.project_id)
        .bind(data.assignee_id)
        .fetch_one(pool)
        .await?;

        Ok(task)
    }

    pub async fn update_status(
        pool: &PgPool,
        id: i32,
        status: TaskStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET status = $2, updated_at = NOW() WHERE id = $1 {TASK_RETURNING}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// Sets or clears (`None`) the assignee
    pub async fn update_assignee(
        pool: &PgPool,
        id: i32,
        assignee_id: Option<i32>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET assignee_id = $2, updated_at = NOW() WHERE id = $1 {TASK_RETURNING}"
        ))
        .bind(id)
        .bind(assignee_id)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    pub async fn delete(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Number of tasks per status; statuses with no tasks are omitted
    pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(TaskStatus, i64)>, sqlx::Error> {
        let counts = sqlx::query_as::<_, (TaskStatus, i64)>(
            "SELECT status, COUNT(*) FROM tasks GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await?;

        Ok(counts)
    }

    /// Most recently updated tasks across all projects
    pub async fn recent_activity(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<RecentActivity>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(TASK_SELECT);
        qb.push(" ORDER BY t.updated_at DESC LIMIT ").push_bind(limit);

        let rows: Vec<TaskRow> = qb.build_query_as().fetch_all(pool).await?;

        Ok(rows.into_iter().map(RecentActivity::from).collect())
    }
}
