use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::ApiResponse;

use crate::extractors::ClientAddr;
use crate::models::{NewUser, User};
use crate::routes::auth::{auth_response, AuthResponse};
use crate::routes::rate_limit::{check_rate_limit, RateScope};
use crate::schema::users;
use crate::services::email_service::{self, Outgoing};
use crate::services::{auth_service, verification};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize, Validate)]
pub struct SendCodeRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[serde(default)]
    pub purpose: CodePurpose,
}

/// Selects the email template; the code itself works for either flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    #[default]
    SignIn,
    PasswordReset,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyCodeRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(length(equal = 6, message = "verification code must be 6 digits"))]
    pub verification_code: String,
    pub password: Option<String>,
    #[validate(length(min = 1, max = 100, message = "display name must be 1-100 characters"))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(length(equal = 6, message = "verification code must be 6 digits"))]
    pub verification_code: String,
    pub new_password: String,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub message: String,
    pub verification_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    pub message: String,
    pub is_new_user: bool,
    pub requires_password: bool,
    #[serde(flatten)]
    pub auth: Option<AuthResponse>,
}

// --- Handlers ---

/// POST /auth/email/send-code - email a one-time code
pub async fn send_code(
    State(state): State<Arc<AppState>>,
    client: ClientAddr,
    Json(req): Json<SendCodeRequest>,
) -> AppResult<Json<ApiResponse<SendCodeResponse>>> {
    issue_and_send(&state, &client, req).await
}

/// POST /auth/email/resend-code - same as send-code; earlier codes stop working
pub async fn resend_code(
    State(state): State<Arc<AppState>>,
    client: ClientAddr,
    Json(req): Json<SendCodeRequest>,
) -> AppResult<Json<ApiResponse<SendCodeResponse>>> {
    issue_and_send(&state, &client, req).await
}

async fn issue_and_send(
    state: &AppState,
    client: &ClientAddr,
    req: SendCodeRequest,
) -> AppResult<Json<ApiResponse<SendCodeResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let email = auth_service::normalize_email(&req.email);
    auth_service::ensure_email_domain(&email, &state.allowed_domains)?;
    check_rate_limit(state, RateScope::Email, client).await?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let existing_user = users::table
        .filter(users::email.eq(&email))
        .select(users::id)
        .first::<Uuid>(&mut conn)
        .optional()?;

    let row = verification::issue_code(&mut conn, &email, existing_user, Utc::now())?;

    let outgoing = match req.purpose {
        CodePurpose::SignIn => Outgoing::VerificationCode { to: &email, code: &row.verification_code },
        CodePurpose::PasswordReset => Outgoing::PasswordReset { to: &email, code: &row.verification_code },
    };
    email_service::dispatch(state.email.as_ref(), &state.config.app_name, outgoing);

    tracing::info!(verification_id = %row.id, existing_user = existing_user.is_some(), "verification code sent");

    Ok(Json(ApiResponse::ok(SendCodeResponse {
        message: "Verification code sent".to_string(),
        verification_id: row.id,
        expires_at: row.expires_at,
    })))
}

/// POST /auth/email/verify-code - sign in or sign up with a code
///
/// Existing users get a token straight away. A new email without a password
/// answers `requires_password` and leaves the code usable for the follow-up call.
pub async fn verify_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyCodeRequest>,
) -> AppResult<Json<ApiResponse<VerifyCodeResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    if let Some(password) = &req.password {
        auth_service::validate_password(password)?;
    }

    let email = auth_service::normalize_email(&req.email);
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let code = verification::find_valid_code(&mut conn, &email, &req.verification_code, Utc::now())?;

    let existing = users::table
        .filter(users::email.eq(&email))
        .first::<User>(&mut conn)
        .optional()?;

    if let Some(user) = existing {
        if !user.is_active {
            return Err(AppError::new(ErrorCode::AccountDisabled, "account is disabled"));
        }
        verification::consume_code(&mut conn, code.id, Some(user.id))?;
        tracing::info!(user_id = %user.id, "user signed in with email code");

        return Ok(Json(ApiResponse::ok(VerifyCodeResponse {
            message: "Signed in".to_string(),
            is_new_user: false,
            requires_password: false,
            auth: Some(auth_response(&state, &mut conn, &user)?),
        })));
    }

    let Some(password) = req.password else {
        return Ok(Json(ApiResponse::ok(VerifyCodeResponse {
            message: "Code verified, set a password to finish registration".to_string(),
            is_new_user: true,
            requires_password: true,
            auth: None,
        })));
    };

    let new_user = NewUser {
        display_name: req
            .display_name
            .unwrap_or_else(|| auth_service::default_display_name(&email)),
        hashed_password: Some(auth_service::hash_password(&password)?),
        email: email.clone(),
    };

    let user = conn.transaction::<_, AppError, _>(|conn| {
        let user: User = diesel::insert_into(users::table)
            .values(&new_user)
            .get_result(conn)?;
        verification::consume_code(conn, code.id, Some(user.id))?;
        Ok(user)
    })?;

    email_service::dispatch(
        state.email.as_ref(),
        &state.config.app_name,
        Outgoing::Welcome { to: &user.email, display_name: &user.display_name },
    );

    tracing::info!(user_id = %user.id, "user registered with email code");

    Ok(Json(ApiResponse::ok(VerifyCodeResponse {
        message: "Account created".to_string(),
        is_new_user: true,
        requires_password: false,
        auth: Some(auth_response(&state, &mut conn, &user)?),
    })))
}

/// POST /auth/email/reset-password - set a new password using a code
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<qupid_shared::types::MessageBody>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    auth_service::validate_password(&req.new_password)?;

    let email = auth_service::normalize_email(&req.email);
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let code = verification::find_valid_code(&mut conn, &email, &req.verification_code, Utc::now())?;

    let user = users::table
        .filter(users::email.eq(&email))
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    let hashed = auth_service::hash_password(&req.new_password)?;

    conn.transaction::<_, AppError, _>(|conn| {
        verification::consume_code(conn, code.id, Some(user.id))?;
        diesel::update(users::table.find(user.id))
            .set((
                users::hashed_password.eq(Some(hashed)),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
        Ok(())
    })?;

    tracing::info!(user_id = %user.id, "password reset");

    Ok(Json(ApiResponse::message("Password has been reset")))
}
