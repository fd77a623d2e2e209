//! Access log line per response
//!
//! `GET /api/tasks 200 3.412 ms - user:alice@example.com (role:MANAGER)`
//!
//! The caller is read from the [`AuthContext`] the auth layer copies into
//! the response extensions; unauthenticated requests log as `anonymous`.
//! Successful `/health` probes are skipped.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use std::time::Instant;
use taskboard_shared::auth::middleware::AuthContext;

pub async fn request_logger(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    if should_skip(uri.path(), status) {
        return response;
    }

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let user = describe_user(response.extensions().get::<AuthContext>());

    tracing::info!(
        target: "taskboard_api::access",
        method = %method,
        path = %uri.path(),
        status = status.as_u16(),
        elapsed_ms,
        "{} {} {} {:.3} ms - {}",
        method,
        uri,
        status.as_u16(),
        elapsed_ms,
        user
    );

    response
}

fn should_skip(path: &str, status: StatusCode) -> bool {
    path == "/health" && status == StatusCode::OK
}

fn describe_user(ctx: Option<&AuthContext>) -> String {
    match ctx {
        Some(ctx) => format!("user:{} (role:{})", ctx.email, ctx.role),
        None => "anonymous".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_shared::models::user::Role;

    #[test]
    fn test_describe_user() {
        let ctx = AuthContext {
            user_id: 4,
            email: "dana@example.com".to_string(),
            role: Role::Manager,
        };
        assert_eq!(
            describe_user(Some(&ctx)),
            "user:dana@example.com (role:MANAGER)"
        );
        assert_eq!(describe_user(None), "anonymous");
    }

    #[test]
    fn test_only_healthy_probes_are_skipped() {
        assert!(should_skip("/health", StatusCode::OK));
        assert!(!should_skip("/health", StatusCode::SERVICE_UNAVAILABLE));
        assert!(!should_skip("/api/tasks", StatusCode::OK));
    }
}
