//! Role gates and row scopes
//!
//! Route-level checks are a plain allow-list of roles. Row-level access is
//! not checked here: handlers pass the caller's [`Visibility`] into the
//! model queries, so rows outside the caller's scope simply do not exist
//! for them (and surface as 404).
//!
//! | Role    | Visibility            | Gated routes              |
//! |---------|-----------------------|---------------------------|
//! | ADMIN   | everything            | all                       |
//! | MANAGER | own projects' rows    | project/task mutations    |
//! | USER    | rows assigned to them | task status updates only  |
//!
//! # Example
//!
//! ```
//! use taskboard_shared::auth::authorization::require_manager_or_admin;
//! use taskboard_shared::auth::middleware::AuthContext;
//! use taskboard_shared::models::user::Role;
//!
//! let ctx = AuthContext { user_id: 1, email: "u@example.com".into(), role: Role::User };
//! assert!(require_manager_or_admin(&ctx).is_err());
//! ```

use super::middleware::AuthContext;
use crate::models::user::Role;
use crate::models::Visibility;

/// Error type for authorization checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// Caller's role is not in the allow-list
    #[error("This action requires one of: {}", join_roles(.allowed))]
    InsufficientRole { allowed: Vec<Role>, actual: Role },
}

fn join_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Succeeds if the caller holds one of `allowed`
pub fn require_role(ctx: &AuthContext, allowed: &[Role]) -> Result<(), AuthzError> {
    if allowed.contains(&ctx.role) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole {
            allowed: allowed.to_vec(),
            actual: ctx.role,
        })
    }
}

pub fn require_manager_or_admin(ctx: &AuthContext) -> Result<(), AuthzError> {
    require_role(ctx, &[Role::Manager, Role::Admin])
}

pub fn require_admin(ctx: &AuthContext) -> Result<(), AuthzError> {
    require_role(ctx, &[Role::Admin])
}

impl Visibility {
    /// Scope for an authenticated caller
    pub fn for_context(ctx: &AuthContext) -> Self {
        Visibility::for_role(ctx.role, ctx.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: Role) -> AuthContext {
        AuthContext {
            user_id: 9,
            email: "caller@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_require_manager_or_admin() {
        assert!(require_manager_or_admin(&ctx(Role::Admin)).is_ok());
        assert!(require_manager_or_admin(&ctx(Role::Manager)).is_ok());
        assert_eq!(
            require_manager_or_admin(&ctx(Role::User)),
            Err(AuthzError::InsufficientRole {
                allowed: vec![Role::Manager, Role::Admin],
                actual: Role::User,
            })
        );
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&ctx(Role::Admin)).is_ok());
        assert!(require_admin(&ctx(Role::Manager)).is_err());
        assert!(require_admin(&ctx(Role::User)).is_err());
    }

    #[test]
    fn test_error_message_lists_roles() {
        let err = require_manager_or_admin(&ctx(Role::User)).unwrap_err();
        assert_eq!(err.to_string(), "This action requires one of: MANAGER, ADMIN");
    }

    #[test]
    fn test_visibility_for_context() {
        assert_eq!(Visibility::for_context(&ctx(Role::Admin)), Visibility::All);
        assert_eq!(
            Visibility::for_context(&ctx(Role::User)),
            Visibility::AssignedTo(9)
        );
    }
}
