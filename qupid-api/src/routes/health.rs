use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::prelude::*;
use std::sync::Arc;

use qupid_shared::types::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

fn database_check(state: &AppState) -> HealthCheck {
    let result = state
        .db
        .get()
        .map_err(|e| e.to_string())
        .and_then(|mut conn| diesel::sql_query("SELECT 1").execute(&mut conn).map_err(|e| e.to_string()));

    match result {
        Ok(_) => HealthCheck::healthy("database"),
        Err(e) => HealthCheck::failed("database", HealthStatus::Unhealthy, e),
    }
}

// --- GET /health ---

pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let checks = vec![database_check(&state)];
    let response = HealthResponse::healthy("qupid-api", env!("CARGO_PKG_VERSION")).with_checks(checks);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

// --- GET /metrics ---

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
