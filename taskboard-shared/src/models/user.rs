//! User model and database operations
//!
//! Users are a local mirror of the identity provider's accounts. The id is
//! assigned by the IdP and carried in the `userId` token claim; rows are
//! upserted on each authenticated request and reconciled in bulk by the
//! admin sync endpoint.
//!
//! # Schema
//!
//! ```sql
//! CREATE TYPE user_role AS ENUM ('USER', 'MANAGER', 'ADMIN');
//!
//! CREATE TABLE users (
//!     id INTEGER PRIMARY KEY,
//!     email TEXT NOT NULL UNIQUE,
//!     role user_role NOT NULL DEFAULT 'USER',
//!     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
//!     linkedin_id TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::models::user::{Role, UpsertUser, User};
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
//! let user = User::upsert(&pool, &UpsertUser {
//!     id: 42,
//!     email: "dev@example.com".to_string(),
//!     role: Role::User,
//!     email_verified: true,
//!     created_at: None,
//! })
//! .await?;
//!
//! let found = User::find_by_id(&pool, user.id).await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgExecutor, PgPool, Postgres, QueryBuilder};
use std::fmt;
use std::str::FromStr;

use super::project::{OwnedProject, ProjectRef};
use super::task::TaskStatus;

/// Access role, ordered from least to most privileged
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Works on tasks assigned to them
    User,

    /// Owns projects and manages their tasks
    Manager,

    /// Unrestricted access, including user administration
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Manager, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Manager => "MANAGER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not exactly `USER`, `MANAGER` or `ADMIN`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "MANAGER" => Ok(Role::Manager),
            "ADMIN" => Ok(Role::Admin),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// A user row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// IdP-assigned user id
    pub id: i32,

    /// Email address (the token `sub`)
    pub email: String,

    pub role: Role,

    pub email_verified: bool,

    /// Linked LinkedIn account, when the IdP login came from there
    pub linkedin_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// `{id, email}` reference embedded in project and task payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i32,
    pub email: String,
}

/// Input for [`User::upsert`]
#[derive(Debug, Clone)]
pub struct UpsertUser {
    pub id: i32,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,

    /// Creation time reported by the IdP; defaults to now on insert
    pub created_at: Option<DateTime<Utc>>,
}

/// Filters for the admin user listing
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring of the email
    pub search: Option<String>,

    pub role: Option<Role>,
}

impl UserFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE TRUE");

        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            qb.push(" AND u.email ILIKE ")
                .push_bind(format!("%{}%", super::escape_like(search)));
        }

        if let Some(role) = self.role {
            qb.push(" AND u.role = ").push_bind(role);
        }
    }
}

/// Relation counts shown next to each user in the admin listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounts {
    pub projects_owned: i64,
    pub tasks_assigned: i64,
}

/// One entry of the admin user listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListItem {
    pub id: i32,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,

    #[serde(rename = "_count")]
    pub counts: UserCounts,
}

/// Page metadata for the admin user listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    /// `limit` must be positive
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}

/// One page of [`UserListItem`]s
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPage {
    pub users: Vec<UserListItem>,
    pub pagination: Pagination,
}

#[derive(sqlx::FromRow)]
struct UserListRow {
    id: i32,
    email: String,
    role: Role,
    email_verified: bool,
    created_at: DateTime<Utc>,
    projects_owned: i64,
    tasks_assigned: i64,
}

impl From<UserListRow> for UserListItem {
    fn from(row: UserListRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: row.role,
            email_verified: row.email_verified,
            created_at: row.created_at,
            counts: UserCounts {
                projects_owned: row.projects_owned,
                tasks_assigned: row.tasks_assigned,
            },
        }
    }
}

/// Task assigned to a user, as shown on the admin user detail page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedTask {
    pub id: i32,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub project: ProjectRef,
}

#[derive(sqlx::FromRow)]
struct AssignedTaskRow {
    id: i32,
    title: String,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    project_id: i32,
    project_name: String,
}

/// A user with the projects they manage and the tasks assigned to them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub id: i32,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    pub linkedin_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub projects_owned: Vec<OwnedProject>,
    pub tasks_assigned: Vec<AssignedTask>,
}

const USER_COLUMNS: &str = "id, email, role, email_verified, linkedin_id, created_at, updated_at";

impl User {
    /// Inserts or refreshes a user by id
    ///
    /// Email, role and verification state are overwritten; `created_at` is
    /// only used on insert.
    ///
    /// # Errors
    ///
    /// Fails if another user already holds the email address.
    pub async fn upsert<'e, E>(executor: E, data: &UpsertUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, role, email_verified, created_at)
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()))
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                role = EXCLUDED.role,
                email_verified = EXCLUDED.email_verified,
                updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(data.id)
        .bind(&data.email)
        .bind(data.role)
        .bind(data.email_verified)
        .bind(data.created_at)
        .fetch_one(executor)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Changes a user's role
    ///
    /// Returns None if the user does not exist.
    pub async fn update_role(
        pool: &PgPool,
        id: i32,
        role: Role,
    ) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET role = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Deletes every user whose id is not in `keep_ids`
    ///
    /// Projects they manage are removed with them; tasks assigned to them
    /// become unassigned. Returns the number of deleted users.
    pub async fn delete_except<'e, E>(executor: E, keep_ids: &[i32]) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM users WHERE NOT (id = ANY($1))")
            .bind(keep_ids)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// Lists users newest first, with relation counts
    pub async fn list(
        pool: &PgPool,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserListItem>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT u.id, u.email, u.role, u.email_verified, u.created_at,
                   (SELECT COUNT(*) FROM projects p WHERE p.manager_id = u.id) AS projects_owned,
                   (SELECT COUNT(*) FROM tasks t WHERE t.assignee_id = u.id) AS tasks_assigned
            FROM users u
            "#,
        );
        filter.push_where(&mut qb);
        qb.push(" ORDER BY u.created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<UserListRow> = qb.build_query_as().fetch_all(pool).await?;

        Ok(rows.into_iter().map(UserListItem::from).collect())
    }

    /// Counts users matching `filter`
    pub async fn count_filtered(pool: &PgPool, filter: &UserFilter) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users u");
        filter.push_where(&mut qb);

        let (count,): (i64,) = qb.build_query_as().fetch_one(pool).await?;

        Ok(count)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Number of users per role; roles with no users are omitted
    pub async fn count_by_role(pool: &PgPool) -> Result<Vec<(Role, i64)>, sqlx::Error> {
        let counts = sqlx::query_as::<_, (Role, i64)>(
            "SELECT role, COUNT(*) FROM users GROUP BY role ORDER BY role",
        )
        .fetch_all(pool)
        .await?;

        Ok(counts)
    }

    /// Loads a user with owned projects and assigned tasks, newest first
    pub async fn details(pool: &PgPool, id: i32) -> Result<Option<UserDetails>, sqlx::Error> {
        let Some(user) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let projects_owned = OwnedProject::list_for_manager(pool, id).await?;

        let tasks_assigned = sqlx::query_as::<_, AssignedTaskRow>(
            r#"
            SELECT t.id, t.title, t.status, t.created_at,
                   p.id AS project_id, p.name AS project_name
            FROM tasks t
            JOIN projects p ON p.id = t.project_id
            WHERE t.assignee_id = $1
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| AssignedTask {
            id: row.id,
            title: row.title,
            status: row.status,
            created_at: row.created_at,
            project: ProjectRef {
                id: row.project_id,
                name: row.project_name,
            },
        })
        .collect();

        Ok(Some(UserDetails {
            id: user.id,
            email: user.email,
            role: user.role,
            email_verified: user.email_verified,
            linkedin_id: user.linkedin_id,
            created_at: user.created_at,
            projects_owned,
            tasks_assigned,
        }))
    }
}
