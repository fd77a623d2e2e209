//! Typed HTTP client for the Taskboard API
//!
//! Every request carries the current access token. A 401 triggers one token
//! refresh at the identity provider and a single retry of the request.
//!
//! # Refresh coordination
//!
//! Only one refresh runs at a time. The session carries a generation number
//! that changes whenever its tokens do. A request remembers the generation it
//! was sent with; when it gets a 401 it takes the refresh gate and compares:
//!
//! - unchanged: it performs the refresh itself
//! - changed: another request already refreshed (or gave up), so it reuses
//!   that outcome without calling the IdP again
//!
//! A failed refresh clears the session, which makes every waiting request
//! fail with [`ClientError::SessionExpired`].

use crate::error::{ClientError, ClientResult};
use crate::session::{TokenStore, Tokens};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use taskboard_shared::{
    idp::SyncSummary,
    models::{
        project::ProjectWithRelations,
        stats::AdminStats,
        task::{TaskStatus, TaskWithRelations},
        user::{Role, User, UserDetails, UserPage},
    },
};
use tokio::sync::{Mutex, RwLock};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const REFRESH_PATH: &str = "/api/auth/refresh-token";

/// Where the API and the identity provider live
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Taskboard API base URL, e.g. `http://localhost:3001`
    pub base_url: String,

    /// Identity provider base URL, used for token refresh
    pub idp_url: String,

    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, idp_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base(base_url.into()),
            idp_url: trim_base(idp_url.into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Filters for [`ApiClient::users`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsersQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// `GET /health` payload
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub success: bool,
    pub status: String,
    pub message: String,
    pub version: String,
    pub database: String,
    pub environment: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> ClientResult<T> {
        self.data
            .ok_or_else(|| ClientError::Decode("response carried no data".to_string()))
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,

    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Default)]
struct Session {
    tokens: Option<Tokens>,
    generation: u64,
}

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    store: Arc<dyn TokenStore>,
    session: RwLock<Session>,
    refresh_gate: Mutex<()>,
}

/// Cheaply cloneable client; clones share one session
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Call {
    method: Method,
    path: String,
    query: Option<UsersQuery>,
    body: Option<Value>,
}

impl Call {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: None,
        }
    }

    fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

impl ApiClient {
    /// Builds a client and loads any session saved in `store`
    pub async fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> ClientResult<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let tokens = store.load().await?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                store,
                session: RwLock::new(Session {
                    tokens,
                    generation: 0,
                }),
                refresh_gate: Mutex::new(()),
            }),
        })
    }

    /// Current tokens, if signed in
    pub async fn tokens(&self) -> Option<Tokens> {
        self.inner.session.read().await.tokens.clone()
    }

    /// Starts a session with tokens obtained at sign-in
    pub async fn set_tokens(&self, tokens: Tokens) -> ClientResult<()> {
        self.inner.store.save(&tokens).await?;
        let mut session = self.inner.session.write().await;
        session.tokens = Some(tokens);
        session.generation += 1;
        Ok(())
    }

    pub async fn logout(&self) -> ClientResult<()> {
        self.clear_session().await
    }

    // Projects

    pub async fn projects(&self) -> ClientResult<Vec<ProjectWithRelations>> {
        self.data(Call::new(Method::GET, "/api/projects")).await
    }

    pub async fn project(&self, id: i32) -> ClientResult<ProjectWithRelations> {
        self.data(Call::new(Method::GET, format!("/api/projects/{}", id)))
            .await
    }

    pub async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> ClientResult<ProjectWithRelations> {
        let call = Call::new(Method::POST, "/api/projects")
            .json(json!({ "name": name, "description": description }));
        self.data(call).await
    }

    /// Fields left as `None` are not changed
    pub async fn update_project(
        &self,
        id: i32,
        name: Option<&str>,
        description: Option<&str>,
    ) -> ClientResult<ProjectWithRelations> {
        let mut body = serde_json::Map::new();
        if let Some(name) = name {
            body.insert("name".to_string(), json!(name));
        }
        if let Some(description) = description {
            body.insert("description".to_string(), json!(description));
        }

        let call = Call::new(Method::PUT, format!("/api/projects/{}", id)).json(Value::Object(body));
        self.data(call).await
    }

    /// Returns the confirmation message
    pub async fn delete_project(&self, id: i32) -> ClientResult<String> {
        self.message(Call::new(Method::DELETE, format!("/api/projects/{}", id)))
            .await
    }

    // Tasks

    pub async fn tasks(&self) -> ClientResult<Vec<TaskWithRelations>> {
        self.data(Call::new(Method::GET, "/api/tasks")).await
    }

    pub async fn task(&self, id: i32) -> ClientResult<TaskWithRelations> {
        self.data(Call::new(Method::GET, format!("/api/tasks/{}", id)))
            .await
    }

    pub async fn create_task(
        &self,
        project_id: i32,
        title: &str,
        assignee_id: Option<i32>,
    ) -> ClientResult<TaskWithRelations> {
        let call = Call::new(Method::POST, format!("/api/projects/{}/tasks", project_id))
            .json(json!({ "title": title, "assigneeId": assignee_id }));
        self.data(call).await
    }

    pub async fn update_task_status(
        &self,
        id: i32,
        status: TaskStatus,
    ) -> ClientResult<TaskWithRelations> {
        let call = Call::new(Method::PUT, format!("/api/tasks/{}/status", id))
            .json(json!({ "status": status }));
        self.data(call).await
    }

    /// `None` unassigns the task
    pub async fn assign_task(
        &self,
        id: i32,
        assignee_id: Option<i32>,
    ) -> ClientResult<TaskWithRelations> {
        let call = Call::new(Method::PUT, format!("/api/tasks/{}/assign", id))
            .json(json!({ "assigneeId": assignee_id }));
        self.data(call).await
    }

    pub async fn delete_task(&self, id: i32) -> ClientResult<String> {
        self.message(Call::new(Method::DELETE, format!("/api/tasks/{}", id)))
            .await
    }

    // Administration

    pub async fn users(&self, query: UsersQuery) -> ClientResult<UserPage> {
        let mut call = Call::new(Method::GET, "/api/admin/users");
        call.query = Some(query);
        self.data(call).await
    }

    pub async fn user(&self, id: i32) -> ClientResult<UserDetails> {
        self.data(Call::new(Method::GET, format!("/api/admin/users/{}", id)))
            .await
    }

    pub async fn update_user_role(&self, id: i32, role: Role) -> ClientResult<User> {
        let call = Call::new(Method::PUT, format!("/api/admin/users/{}/role", id))
            .json(json!({ "role": role }));
        self.data(call).await
    }

    pub async fn admin_stats(&self) -> ClientResult<AdminStats> {
        self.data(Call::new(Method::GET, "/api/admin/stats")).await
    }

    pub async fn dashboard_stats(&self) -> ClientResult<AdminStats> {
        self.data(Call::new(Method::GET, "/api/admin/dashboard-stats"))
            .await
    }

    pub async fn sync_users(&self) -> ClientResult<SyncSummary> {
        self.data(Call::new(Method::POST, "/api/admin/sync-users"))
            .await
    }

    /// Unauthenticated service health
    pub async fn health(&self) -> ClientResult<HealthStatus> {
        let url = format!("{}/health", self.inner.config.base_url);
        let response = self.inner.http.get(url).send().await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn data<T: DeserializeOwned>(&self, call: Call) -> ClientResult<T> {
        self.send::<T>(call).await?.into_data()
    }

    async fn message(&self, call: Call) -> ClientResult<String> {
        let envelope = self.send::<Value>(call).await?;
        Ok(envelope.message.unwrap_or_default())
    }

    /// Sends `call`, refreshing the session and retrying once on 401
    async fn send<T: DeserializeOwned>(&self, call: Call) -> ClientResult<Envelope<T>> {
        let (token, generation) = {
            let session = self.inner.session.read().await;
            let token = session.tokens.as_ref().map(|t| t.access_token.clone());
            (token, session.generation)
        };

        let mut response = self.execute(&call, token.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let token = self.refresh(generation).await?;
            response = self.execute(&call, Some(&token)).await?;
        }

        parse(response).await
    }

    async fn execute(&self, call: &Call, token: Option<&str>) -> ClientResult<reqwest::Response> {
        let url = format!("{}{}", self.inner.config.base_url, call.path);
        let mut request = self.inner.http.request(call.method.clone(), url);

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(query) = &call.query {
            request = request.query(query);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    /// Returns a fresh access token for a request sent at `seen_generation`
    async fn refresh(&self, seen_generation: u64) -> ClientResult<String> {
        let _gate = self.inner.refresh_gate.lock().await;

        let refresh_token = {
            let session = self.inner.session.read().await;
            if session.generation != seen_generation {
                return session
                    .tokens
                    .as_ref()
                    .map(|t| t.access_token.clone())
                    .ok_or(ClientError::SessionExpired);
            }
            session.tokens.as_ref().and_then(|t| t.refresh_token.clone())
        };

        let Some(refresh_token) = refresh_token else {
            self.clear_session().await?;
            return Err(ClientError::SessionExpired);
        };

        tracing::debug!("Access token rejected, refreshing session");

        match self.request_refresh(&refresh_token).await {
            Ok(refreshed) => {
                let tokens = Tokens {
                    access_token: refreshed.access_token,
                    refresh_token: refreshed.refresh_token.or(Some(refresh_token)),
                };
                let access_token = tokens.access_token.clone();
                self.set_tokens(tokens).await?;
                Ok(access_token)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Token refresh failed, clearing session");
                self.clear_session().await?;
                Err(ClientError::SessionExpired)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> ClientResult<RefreshResponse> {
        let url = format!("{}{}", self.inner.config.idp_url, REFRESH_PATH);
        let response = self
            .inner
            .http
            .post(url)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, &response.bytes().await?));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn clear_session(&self) -> ClientResult<()> {
        {
            let mut session = self.inner.session.write().await;
            session.tokens = None;
            session.generation += 1;
        }
        self.inner.store.clear().await
    }
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<Envelope<T>> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        return Err(api_error(status, &bytes));
    }

    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

fn api_error(status: StatusCode, body: &[u8]) -> ClientError {
    let envelope = serde_json::from_slice::<ErrorEnvelope>(body).ok();
    let (error, message) = match envelope {
        Some(e) => (e.error, e.message),
        None => (None, None),
    };

    ClientError::Api {
        status: status.as_u16(),
        error: error.unwrap_or_else(|| "unknown".to_string()),
        message: message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = ClientConfig::new("http://api.local/", "http://idp.local//");
        assert_eq!(config.base_url, "http://api.local");
        assert_eq!(config.idp_url, "http://idp.local");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_api_error_reads_envelope() {
        let err = api_error(
            StatusCode::FORBIDDEN,
            br#"{"success":false,"error":"forbidden","message":"Access denied"}"#,
        );
        match err {
            ClientError::Api {
                status,
                error,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(error, "forbidden");
                assert_eq!(message, "Access denied");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_api_error_without_envelope() {
        let err = api_error(StatusCode::BAD_GATEWAY, b"<html>oops</html>");
        assert_eq!(err.status(), Some(502));
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn test_users_query_skips_unset_fields() {
        let query = UsersQuery {
            page: Some(2),
            role: Some(Role::Manager),
            ..Default::default()
        };
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json, json!({ "page": 2, "role": "MANAGER" }));
    }

    #[test]
    fn test_envelope_without_data() {
        let envelope: Envelope<Value> =
            serde_json::from_str(r#"{"success":true,"message":"Task deleted successfully"}"#)
                .unwrap();
        assert_eq!(envelope.message.as_deref(), Some("Task deleted successfully"));
        assert!(envelope.into_data().is_err());
    }
}
