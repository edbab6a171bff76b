use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use qupid_shared::errors::{AppError, AppResult, ErrorCode};

use crate::extractors::ClientAddr;
use crate::AppState;

/// Named limits. Each scope has its own window and key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    Api,
    Email,
}

impl RateScope {
    pub fn window(&self) -> Duration {
        match self {
            RateScope::Api => Duration::from_secs(60),
            RateScope::Email => Duration::from_secs(3600),
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            RateScope::Api => "api",
            RateScope::Email => "email",
        }
    }

    fn error_code(&self) -> ErrorCode {
        match self {
            RateScope::Api => ErrorCode::RateLimited,
            RateScope::Email => ErrorCode::EmailRateLimited,
        }
    }

    fn limit(&self, state: &AppState) -> u64 {
        match self {
            RateScope::Api => state.config.api_rate_limit_per_minute,
            RateScope::Email => state.config.email_rate_limit_per_hour,
        }
    }
}

/// Records a hit for `client` and rejects with 429 once the scope's limit is
/// reached. A failing counter backend lets the request through.
pub async fn check_rate_limit(state: &AppState, scope: RateScope, client: &ClientAddr) -> AppResult<()> {
    let key = format!("{}:{}", scope.prefix(), client.0);
    let window = scope.window();

    match state.rate_limiter.hit(&key, scope.limit(state), window).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!(client = %client.0, scope = scope.prefix(), "rate limit exceeded");
            metrics::counter!("rate_limited_total", "scope" => scope.prefix()).increment(1);
            Err(AppError::rate_limited(scope.error_code(), window.as_secs()))
        }
        Err(e) => {
            tracing::warn!(error = %e, "rate limiter unavailable, allowing request");
            Ok(())
        }
    }
}

/// Generic per-client API limit applied to every route except health checks.
pub async fn api_rate_limit(
    State(state): State<Arc<AppState>>,
    client: ClientAddr,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/health" || path == "/metrics" {
        return next.run(req).await;
    }

    if let Err(e) = check_rate_limit(&state, RateScope::Api, &client).await {
        return e.into_response();
    }
    next.run(req).await
}
