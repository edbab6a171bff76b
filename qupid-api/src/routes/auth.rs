use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::auth::UserRole;
use qupid_shared::types::ApiResponse;

use crate::models::{NewUser, User};
use crate::schema::users;
use crate::services::views::{own_profile, OwnProfile};
use crate::services::{auth_service, relations, token_service};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "display name must be 1-100 characters"))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub password: String,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: OwnProfile,
}

/// Issues a bearer token for `user` and renders their own profile.
pub(crate) fn auth_response(state: &AppState, conn: &mut PgConnection, user: &User) -> AppResult<AuthResponse> {
    let token = token_service::create_access_token(
        user.id,
        UserRole::from_admin_flag(user.is_admin),
        &state.config.jwt_secret,
        state.config.access_token_ttl_secs,
    )?;
    let tags = relations::tags_for_user(conn, user.id)?;

    Ok(AuthResponse {
        token,
        token_type: "bearer",
        expires_in: state.config.access_token_ttl_secs,
        user: own_profile(user, &tags, Utc::now().date_naive()),
    })
}

// --- Handlers ---

/// POST /auth/register - create an account with email and password
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    auth_service::validate_password(&req.password)?;

    let email = auth_service::normalize_email(&req.email);
    auth_service::ensure_email_domain(&email, &state.allowed_domains)?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let exists = users::table
        .filter(users::email.eq(&email))
        .count()
        .get_result::<i64>(&mut conn)?
        > 0;
    if exists {
        return Err(AppError::new(ErrorCode::EmailAlreadyExists, "email already registered"));
    }

    let new_user = NewUser {
        display_name: req
            .display_name
            .clone()
            .unwrap_or_else(|| auth_service::default_display_name(&email)),
        hashed_password: Some(auth_service::hash_password(&req.password)?),
        email,
    };

    let user: User = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _) => {
                AppError::new(ErrorCode::EmailAlreadyExists, "email already registered")
            }
            other => AppError::Database(other),
        })?;

    tracing::info!(user_id = %user.id, "user registered");

    let response = auth_response(&state, &mut conn, &user)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(response))))
}

/// POST /auth/login - exchange email and password for a bearer token
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let email = auth_service::normalize_email(&req.email);
    auth_service::ensure_email_domain(&email, &state.allowed_domains)?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let invalid = || AppError::new(ErrorCode::InvalidCredentials, "invalid email or password");

    let user = users::table
        .filter(users::email.eq(&email))
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(invalid)?;

    let hash = user.hashed_password.as_deref().ok_or_else(invalid)?;
    if !auth_service::verify_password(&req.password, hash)? {
        return Err(invalid());
    }

    if !user.is_active {
        return Err(AppError::new(ErrorCode::AccountDisabled, "account is disabled"));
    }

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(ApiResponse::ok(auth_response(&state, &mut conn, &user)?)))
}
