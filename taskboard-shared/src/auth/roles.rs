//! Role normalisation
//!
//! Identity providers spell roles differently: `"ADMIN"`, `"ROLE_ADMIN"`,
//! `["ROLE_USER", "ROLE_MANAGER"]`, `"SCOPE_ROLE_USER openid"` and so on.
//! Every entry is mapped by substring (`ADMIN`, then `MANAGER`, then `USER`,
//! case-insensitive) and a multi-valued claim resolves to its highest role.

use serde_json::Value;

use super::jwt::IdpClaims;
use crate::models::user::Role;

/// Maps one role string by substring
pub fn role_from_str(raw: &str) -> Option<Role> {
    let value = raw.to_ascii_uppercase();

    if value.contains("ADMIN") {
        Some(Role::Admin)
    } else if value.contains("MANAGER") {
        Some(Role::Manager)
    } else if value.contains("USER") {
        Some(Role::User)
    } else {
        None
    }
}

/// Maps a claim value: a string, a space/comma separated string, or an array
pub fn role_from_value(value: &Value) -> Option<Role> {
    match value {
        Value::String(s) => s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .filter_map(role_from_str)
            .max(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(role_from_str)
            .max(),
        _ => None,
    }
}

/// Role carried by the token, checking `role`, `roles`, `authorities`,
/// `scopes` and `scope` in that order
///
/// Returns None when no claim holds a recognisable role; callers treat that
/// as [`Role::User`].
pub fn normalize_role(claims: &IdpClaims) -> Option<Role> {
    [
        &claims.role,
        &claims.roles,
        &claims.authorities,
        &claims.scopes,
        &claims.scope,
    ]
    .into_iter()
    .flatten()
    .find_map(role_from_value)
}
