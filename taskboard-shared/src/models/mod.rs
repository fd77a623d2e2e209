//! Database models for Taskboard
//!
//! Each model owns its SQL. Reads that depend on the caller's role take a
//! [`Visibility`] so the row filter is decided in one place instead of in
//! every handler.
//!
//! # Models
//!
//! - `user`: Local mirror of identity-provider users and their roles
//! - `project`: Projects owned by a manager
//! - `task`: Tasks inside a project, optionally assigned to a user
//! - `stats`: Aggregate counts for the admin dashboard
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::models::{project::Project, Visibility};
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
//! // Projects managed by user 7, each with its tasks
//! let projects = Project::list(&pool, Visibility::ManagedBy(7)).await?;
//! # Ok(())
//! # }
//! ```

pub mod project;
pub mod stats;
pub mod task;
pub mod user;

use user::Role;

/// Row-level scope applied to project and task queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Every row (administrators)
    All,

    /// Rows belonging to projects managed by this user
    ManagedBy(i32),

    /// Rows involving tasks assigned to this user
    AssignedTo(i32),
}

impl Visibility {
    /// Scope granted to a caller holding `role`
    pub fn for_role(role: Role, user_id: i32) -> Self {
        match role {
            Role::Admin => Visibility::All,
            Role::Manager => Visibility::ManagedBy(user_id),
            Role::User => Visibility::AssignedTo(user_id),
        }
    }

    /// Assignee restriction for nested task lists, if any
    pub fn assignee_filter(&self) -> Option<i32> {
        match self {
            Visibility::AssignedTo(user_id) => Some(*user_id),
            _ => None,
        }
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside `LIKE`
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
