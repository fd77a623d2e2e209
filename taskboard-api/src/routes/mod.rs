//! API route handlers
//!
//! This module contains all route handlers organized by resource:
//!
//! - `health`: Health check endpoint
//! - `projects`: Project CRUD and task creation
//! - `tasks`: Task listing, status changes, reassignment and deletion
//! - `admin`: User administration, statistics and IdP synchronisation

pub mod admin;
pub mod health;
pub mod projects;
pub mod tasks;

use crate::error::{ApiError, ApiResult};

/// Trimmed, non-empty text or a 400 with `message`
pub(crate) fn required_text(value: Option<&str>, message: &str) -> ApiResult<String> {
    optional_text(value).ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

/// Trimmed text; blank input becomes `None`
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text(Some("  Launch  "), "x").unwrap(), "Launch");
        assert!(matches!(
            required_text(Some("   "), "Project name is required"),
            Err(ApiError::BadRequest(ref m)) if m == "Project name is required"
        ));
        assert!(required_text(None, "x").is_err());
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text(Some(" notes ")), Some("notes".to_string()));
        assert_eq!(optional_text(Some("")), None);
        assert_eq!(optional_text(None), None);
    }
}
