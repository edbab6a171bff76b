use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use qupid_shared::errors::{AppError, ErrorCode};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const CODE_TTL_MINUTES: i64 = 10;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::internal(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::new(
            ErrorCode::PasswordTooWeak,
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

pub fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

pub fn code_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(CODE_TTL_MINUTES)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// An email passes when its domain equals an allowed domain or is a
/// subdomain of one. An empty allowlist accepts every domain.
pub fn email_domain_allowed(email: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    let domain = domain.to_lowercase();
    allowed.iter().any(|allowed| {
        domain == *allowed
            || domain
                .strip_suffix(allowed.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

pub fn ensure_email_domain(email: &str, allowed: &[String]) -> Result<(), AppError> {
    if email_domain_allowed(email, allowed) {
        return Ok(());
    }
    Err(AppError::with_details(
        ErrorCode::EmailDomainNotAllowed,
        "registration is restricted to university email addresses",
        serde_json::json!({ "allowed_domains": allowed }),
    ))
}

/// Display name derived from the local part of an email address.
pub fn default_display_name(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().take(100).collect())
        .unwrap_or_else(|| "Anonymous".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains() -> Vec<String> {
        vec!["kyushu-u.ac.jp".to_string()]
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn password_length_rule() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
        let err = validate_password("1234567").unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn code_is_six_digits() {
        for _ in 0..50 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn code_expires_after_ten_minutes() {
        let now = Utc::now();
        assert_eq!(code_expiry(now) - now, Duration::minutes(10));
    }

    #[test]
    fn domain_allowlist() {
        assert!(email_domain_allowed("aki@kyushu-u.ac.jp", &domains()));
        assert!(email_domain_allowed("aki@s.Kyushu-U.ac.jp", &domains()));
        assert!(!email_domain_allowed("aki@gmail.com", &domains()));
        assert!(!email_domain_allowed("aki@evilkyushu-u.ac.jp", &domains()));
        assert!(!email_domain_allowed("no-at-sign", &domains()));
        assert!(email_domain_allowed("aki@gmail.com", &[]));
    }

    #[test]
    fn disallowed_domain_is_forbidden() {
        let err = ensure_email_domain("aki@gmail.com", &domains()).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn display_name_from_email() {
        assert_eq!(default_display_name("aki.t@kyushu-u.ac.jp"), "aki.t");
        assert_eq!(default_display_name("@x"), "Anonymous");
    }

    #[test]
    fn email_normalized() {
        assert_eq!(normalize_email("  Aki@Kyushu-U.AC.JP "), "aki@kyushu-u.ac.jp");
    }
}
