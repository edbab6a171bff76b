use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::middleware::decode_token;

use crate::models::User;
use crate::realtime::session;
use crate::schema::users;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

// --- GET /ws?token= ---

/// Browsers cannot set headers on a socket handshake, so the bearer token
/// travels in the query string. It is checked before the upgrade.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    upgrade: Option<WebSocketUpgrade>,
) -> AppResult<Response> {
    let token = params
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing token"))?;
    let claims = decode_token(token.trim(), &state.config.jwt_secret)?;

    let user = {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        users::table
            .find(claims.sub)
            .first::<User>(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "could not validate credentials"))?
    };
    if !user.is_active {
        return Err(AppError::new(ErrorCode::AccountDisabled, "account is disabled"));
    }

    let upgrade = upgrade.ok_or_else(|| AppError::bad_request("expected a websocket upgrade request"))?;
    let user_id = user.id;
    Ok(upgrade.on_upgrade(move |socket| session::run(state, user_id, socket)))
}
