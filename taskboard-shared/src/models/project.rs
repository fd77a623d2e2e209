//! Project model and database operations
//!
//! A project is owned by one manager (a MANAGER or ADMIN user) and holds
//! tasks. Reads are scoped with [`Visibility`]:
//!
//! - `All`: every project
//! - `ManagedBy(id)`: projects whose `manager_id` is `id`
//! - `AssignedTo(id)`: projects with at least one task assigned to `id`;
//!   the nested task list only contains those tasks
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE projects (
//!     id SERIAL PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     description TEXT,
//!     manager_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::task::TaskStatus;
use super::user::{Role, UserSummary};
use super::Visibility;

/// A project row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub manager_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `{id, name}` reference embedded in task payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: i32,
    pub name: String,
}

/// Manager as embedded in project payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectManager {
    pub id: i32,
    pub email: String,
    pub role: Role,
}

/// Task as nested inside a project payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTask {
    pub id: i32,
    pub title: String,
    pub status: TaskStatus,
    pub project_id: i32,
    pub assignee_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assignee: Option<UserSummary>,
}

/// A project with its manager and (visible) tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithRelations {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub manager_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub manager: ProjectManager,
    pub tasks: Vec<ProjectTask>,
}

/// Task count shown next to an owned project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCounts {
    pub tasks: i64,
}

/// A project as listed on its manager's admin detail page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedProject {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,

    #[serde(rename = "_count")]
    pub counts: ProjectCounts,
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: i32,
    name: String,
    description: Option<String>,
    manager_id: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    manager_email: String,
    manager_role: Role,
}

#[derive(sqlx::FromRow)]
struct ProjectTaskRow {
    id: i32,
    title: String,
    status: TaskStatus,
    project_id: i32,
    assignee_id: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    assignee_email: Option<String>,
}

impl From<ProjectTaskRow> for ProjectTask {
    fn from(row: ProjectTaskRow) -> Self {
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
            assignee,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OwnedProjectRow {
    id: i32,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    task_count: i64,
}

/// Appends the row scope for `projects p`
fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, visibility: Visibility) {
    match visibility {
        Visibility::All => {}
        Visibility::ManagedBy(user_id) => {
            qb.push(" AND p.manager_id = ").push_bind(user_id);
        }
        Visibility::AssignedTo(user_id) => {
            qb.push(" AND EXISTS (SELECT 1 FROM tasks t WHERE t.project_id = p.id AND t.assignee_id = ")
                .push_bind(user_id)
                .push(")");
        }
    }
}

impl Project {
    /// Lists visible projects, newest first, with manager and tasks
    pub async fn list(
        pool: &PgPool,
        visibility: Visibility,
    ) -> Result<Vec<ProjectWithRelations>, sqlx::Error> {
        Self::fetch_with_relations(pool, None, visibility).await
    }

    /// Loads one project if it is visible under `visibility`
    pub async fn find(
        pool: &PgPool,
        id: i32,
        visibility: Visibility,
    ) -> Result<Option<ProjectWithRelations>, sqlx::Error> {
        let mut projects = Self::fetch_with_relations(pool, Some(id), visibility).await?;
        Ok(projects.pop())
    }

    /// Loads the bare project row if `visibility` allows it
    ///
    /// Used before mutations, where only ownership matters.
    pub async fn find_row(
        pool: &PgPool,
        id: i32,
        visibility: Visibility,
    ) -> Result<Option<Project>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT p.id, p.name, p.description, p.manager_id, p.created_at, p.updated_at
            FROM projects p
            WHERE p.id = "#,
        );
        qb.push_bind(id);
        push_scope(&mut qb, visibility);

        let project = qb.build_query_as::<Project>().fetch_optional(pool).await?;

        Ok(project)
    }

    async fn fetch_with_relations(
        pool: &PgPool,
        id: Option<i32>,
        visibility: Visibility,
    ) -> Result<Vec<ProjectWithRelations>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT p.id, p.name, p.description, p.manager_id, p.created_at, p.updated_at,
                   m.email AS manager_email, m.role AS manager_role
            FROM projects p
            JOIN users m ON m.id = p.manager_id
            WHERE TRUE"#,
        );
        if let Some(id) = id {
            qb.push(" AND p.id = ").push_bind(id);
        }
        push_scope(&mut qb, visibility);
        qb.push(" ORDER BY p.created_at DESC");

        let rows: Vec<ProjectRow> = qb.build_query_as().fetch_all(pool).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let project_ids: Vec<i32> = rows.iter().map(|row| row.id).collect();

        let mut task_qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT t.id, t.title, t.status, t.project_id, t.assignee_id,
                   t.created_at, t.updated_at, a.email AS assignee_email
            FROM tasks t
            LEFT JOIN users a ON a.id = t.assignee_id
            WHERE t.project_id = ANY("#,
        );
        task_qb.push_bind(project_ids).push(")");
        if let Some(assignee_id) = visibility.assignee_filter() {
            task_qb.push(" AND t.assignee_id = ").push_bind(assignee_id);
        }
        task_qb.push(" ORDER BY t.created_at DESC");

        let task_rows: Vec<ProjectTaskRow> = task_qb.build_query_as().fetch_all(pool).await?;

        let mut tasks_by_project: HashMap<i32, Vec<ProjectTask>> = HashMap::new();
        for row in task_rows {
            tasks_by_project
                .entry(row.project_id)
                .or_default()
                .push(ProjectTask::from(row));
        }

        Ok(rows
            .into_iter()
            .map(|row| ProjectWithRelations {
                tasks: tasks_by_project.remove(&row.id).unwrap_or_default(),
                manager: ProjectManager {
                    id: row.manager_id,
                    email: row.manager_email,
                    role: row.manager_role,
                },
                id: row.id,
                name: row.name,
                description: row.description,
                manager_id: row.manager_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    /// Inserts a project managed by `manager_id`
    pub async fn create(
        pool: &PgPool,
        name: &str,
        description: Option<&str>,
        manager_id: i32,
    ) -> Result<Self, sqlx::Error> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (name, description, manager_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, manager_id, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(manager_id)
        .fetch_one(pool)
        .await?;

        Ok(project)
    }

    /// Updates name and/or description; `None` keeps the stored value
    pub async fn update(
        pool: &PgPool,
        id: i32,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, manager_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(pool)
        .await?;

        Ok(project)
    }

    /// Deletes the project's tasks and then the project, atomically
    ///
    /// Returns false if the project did not exist.
    pub async fn delete(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM tasks WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

impl OwnedProject {
    /// Projects managed by `manager_id`, newest first, with task counts
    pub async fn list_for_manager(pool: &PgPool, manager_id: i32) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, OwnedProjectRow>(
            r#"
            SELECT p.id, p.name, p.description, p.created_at,
                   (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id) AS task_count
            FROM projects p
            WHERE p.manager_id = $1
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(manager_id)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OwnedProject {
                id: row.id,
                name: row.name,
                description: row.description,
                created_at: row.created_at,
                counts: ProjectCounts {
                    tasks: row.task_count,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_row(assignee: Option<(i32, &str)>) -> ProjectTaskRow {
        ProjectTaskRow {
            id: 1,
            title: "Write docs".to_string(),
            status: TaskStatus::Todo,
            project_id: 9,
            assignee_id: assignee.map(|(id, _)| id),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            assignee_email: assignee.map(|(_, email)| email.to_string()),
        }
    }

    #[test]
    fn test_project_task_assignee_from_join() {
        let task = ProjectTask::from(task_row(Some((4, "dev@example.com"))));
        assert_eq!(
            task.assignee,
            Some(UserSummary {
                id: 4,
                email: "dev@example.com".to_string()
            })
        );

        let unassigned = ProjectTask::from(task_row(None));
        assert!(unassigned.assignee.is_none());
    }

    #[test]
    fn test_project_payload_shape() {
        let project = ProjectWithRelations {
            id: 9,
            name: "Launch".to_string(),
            description: None,
            manager_id: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            manager: ProjectManager {
                id: 2,
                email: "pm@example.com".to_string(),
                role: Role::Manager,
            },
            tasks: vec![ProjectTask::from(task_row(None))],
        };

        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["managerId"], 2);
        assert_eq!(json["manager"]["role"], "MANAGER");
        assert!(json["description"].is_null());
        assert!(json["tasks"][0]["assignee"].is_null());
        assert_eq!(json["tasks"][0]["status"], "TODO");
    }
}
