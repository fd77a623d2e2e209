//! Identity provider admin API client
//!
//! The IdP owns user accounts and roles. Admin endpoints on this service
//! forward the caller's own bearer token so the IdP applies its own
//! authorization.
//!
//! - `GET {base}/api/admin/users`: authoritative user list
//! - `PUT {base}/api/admin/users/{id}/role`: change a user's role

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::roles::role_from_str;
use crate::models::user::{Role, UpsertUser};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum IdpError {
    /// The IdP answered with a non-success status
    #[error("IdP returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("IdP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected IdP response: {0}")]
    InvalidPayload(String),
}

/// Outcome of mirroring the IdP user list into the local database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Local users removed because the IdP no longer knows them
    pub deleted: u64,

    /// Users inserted or refreshed from the IdP list
    pub upserted: usize,
}

/// A user as reported by the IdP
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpUser {
    pub id: i32,
    pub email: String,

    /// Role as spelled by the IdP
    pub role: String,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl IdpUser {
    /// Role normalised onto USER / MANAGER / ADMIN (USER if unrecognised)
    pub fn role(&self) -> Role {
        role_from_str(&self.role).unwrap_or(Role::User)
    }

    /// Local upsert payload mirroring this user
    pub fn to_upsert(&self) -> UpsertUser {
        UpsertUser {
            id: self.id,
            email: self.email.clone(),
            role: self.role(),
            email_verified: self.email_verified,
            created_at: self.created_at,
        }
    }
}

#[derive(Serialize)]
struct RoleUpdate {
    role: Role,
}

#[derive(Deserialize)]
struct IdpErrorBody {
    message: Option<String>,
}

/// Client for the IdP admin API
#[derive(Debug, Clone)]
pub struct IdpClient {
    base_url: String,
    http: reqwest::Client,
}

impl IdpClient {
    /// Creates a client with a 10 second request timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self, IdpError> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches every user known to the IdP
    ///
    /// `authorization` is the caller's full `Authorization` header value.
    pub async fn list_users(&self, authorization: &str) -> Result<Vec<IdpUser>, IdpError> {
        let url = format!("{}/api/admin/users", self.base_url);
        debug!(%url, "Fetching users from IdP");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: serde_json::Value = response.json().await?;
        if !body.is_array() {
            return Err(IdpError::InvalidPayload(
                "IdP did not return a user array".to_string(),
            ));
        }

        serde_json::from_value(body).map_err(|e| IdpError::InvalidPayload(e.to_string()))
    }

    /// Sets a user's role at the IdP
    pub async fn update_user_role(
        &self,
        authorization: &str,
        user_id: i32,
        role: Role,
    ) -> Result<(), IdpError> {
        let url = format!("{}/api/admin/users/{}/role", self.base_url, user_id);
        debug!(%url, %role, "Updating role at IdP");

        let response = self
            .http
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .json(&RoleUpdate { role })
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, IdpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<IdpErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| "Request to the identity provider failed".to_string());

    warn!(%status, %message, "IdP request rejected");
    Err(IdpError::Status { status, message })
}
