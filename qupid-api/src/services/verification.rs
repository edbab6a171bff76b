use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{EmailVerification, NewEmailVerification};
use crate::schema::email_verifications;
use crate::services::auth_service::{code_expiry, generate_verification_code};

fn invalid_code() -> AppError {
    AppError::new(ErrorCode::VerificationCodeInvalid, "invalid or expired verification code")
}

/// Persists a fresh code for `email`, superseding any outstanding ones.
pub fn issue_code(
    conn: &mut PgConnection,
    email: &str,
    user_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> AppResult<EmailVerification> {
    conn.transaction::<_, AppError, _>(|conn| {
        let superseded = diesel::update(
            email_verifications::table
                .filter(email_verifications::email.eq(email))
                .filter(email_verifications::is_used.eq(false)),
        )
        .set(email_verifications::is_used.eq(true))
        .execute(conn)?;

        let row = diesel::insert_into(email_verifications::table)
            .values(&NewEmailVerification {
                email: email.to_string(),
                verification_code: generate_verification_code(),
                expires_at: code_expiry(now),
                user_id,
            })
            .get_result::<EmailVerification>(conn)?;

        tracing::debug!(email = %email, superseded, verification_id = %row.id, "verification code issued");
        Ok(row)
    })
}

/// Finds an unused, unexpired code for exactly this email.
pub fn find_valid_code(
    conn: &mut PgConnection,
    email: &str,
    code: &str,
    now: DateTime<Utc>,
) -> AppResult<EmailVerification> {
    let row = email_verifications::table
        .filter(email_verifications::email.eq(email))
        .filter(email_verifications::verification_code.eq(code))
        .filter(email_verifications::is_used.eq(false))
        .order(email_verifications::created_at.desc())
        .first::<EmailVerification>(conn)
        .optional()?
        .ok_or_else(invalid_code)?;

    if row.is_expired_at(now) {
        return Err(invalid_code());
    }
    Ok(row)
}

/// Marks the code used. Only one concurrent caller can win.
pub fn consume_code(conn: &mut PgConnection, verification_id: Uuid, user_id: Option<Uuid>) -> AppResult<()> {
    let target = email_verifications::table
        .filter(email_verifications::id.eq(verification_id))
        .filter(email_verifications::is_used.eq(false));

    let updated = match user_id {
        Some(user_id) => diesel::update(target)
            .set((
                email_verifications::is_used.eq(true),
                email_verifications::user_id.eq(user_id),
            ))
            .execute(conn)?,
        None => diesel::update(target)
            .set(email_verifications::is_used.eq(true))
            .execute(conn)?,
    };

    if updated == 0 {
        return Err(invalid_code());
    }
    Ok(())
}
