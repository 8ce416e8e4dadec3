use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::session::session_router;
use super::student::student_router;
use crate::auth::{RateLimiter, rate_limit};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Signing key for per-session CSRF tokens, loaded from app_meta.
    pub csrf_key: String,
    pub rate_limiter: RateLimiter,
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let admin = admin_router().layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin)
        .nest("/api/v1", session_router())
        .nest("/api/v1", student_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
