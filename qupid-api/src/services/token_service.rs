use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use qupid_shared::errors::AppError;
use qupid_shared::types::auth::{Claims, UserRole};

pub fn create_access_token(
    user_id: Uuid,
    role: UserRole,
    secret: &str,
    ttl_secs: i64,
) -> Result<String, AppError> {
    let claims = Claims::new(user_id, role, ttl_secs);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("JWT encoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qupid_shared::middleware::decode_token;

    #[test]
    fn token_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = create_access_token(user_id, UserRole::Admin, "s3cret", 3600).unwrap();
        let claims = decode_token(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn tampered_token_rejected() {
        let token = create_access_token(Uuid::new_v4(), UserRole::User, "s3cret", 3600).unwrap();
        let tampered = format!("{token}x");
        assert!(decode_token(&tampered, "s3cret").is_err());
    }
}
