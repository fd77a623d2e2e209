//! Health check endpoint
//!
//! Reports that the server is running and whether the database answers.
//!
//! # Endpoint
//!
//! ```text
//! GET /health
//! ```
//!
//! # Response
//!
//! ```json
//! {
//!   "success": true,
//!   "status": "healthy",
//!   "message": "Taskboard API is running",
//!   "version": "0.1.0",
//!   "database": "connected",
//!   "pool": { "active_connections": 1, "idle_connections": 4, "total_connections": 5 },
//!   "environment": "development",
//!   "timestamp": "2024-01-01T00:00:00Z"
//! }
//! ```

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskboard_shared::db::pool::{self, PoolStats};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub success: bool,

    /// `healthy`, or `degraded` when the database is unreachable
    pub status: String,

    pub message: String,

    /// Application version
    pub version: String,

    /// Database status
    pub database: String,

    /// Connection pool usage
    pub pool: PoolStats,

    pub environment: String,

    pub timestamp: DateTime<Utc>,
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let connected = pool::health_check(&state.db).await.is_ok();

    Ok(Json(HealthResponse {
        success: true,
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        message: "Taskboard API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
        pool: pool::get_pool_stats(&state.db),
        environment: state.config.api.environment.clone(),
        timestamp: Utc::now(),
    }))
}
