use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// Liveness: the process is up.
pub async fn healthz() -> &'static str {
    "ok"
}

/// Readiness: the listener is bound and we are not shutting down.
pub async fn readyz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    if *state.readiness.borrow() {
        Ok("ok")
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::NOT_FOUND)
}
