use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use diesel::prelude::*;

use qupid_shared::errors::{AppError, ErrorCode};
use qupid_shared::types::auth::AuthUser;

use crate::models::User;
use crate::schema::users;
use crate::AppState;

/// Authenticated caller with their user row loaded.
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

        let user = users::table
            .find(auth.id)
            .first::<User>(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "could not validate credentials"))?;

        if !user.is_active {
            return Err(AppError::new(ErrorCode::AccountDisabled, "account is disabled"));
        }

        Ok(Self(user))
    }
}

/// Requires the stored admin flag.
pub struct AdminUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::new(ErrorCode::AdminRequired, "admin access required"));
        }
        Ok(Self(user))
    }
}

/// Client identity for rate limiting. The first `X-Forwarded-For` hop counts
/// only behind a trusted proxy; otherwise the peer address, then `unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl ClientAddr {
    pub fn from_parts(parts: &Parts, trust_forwarded: bool) -> Self {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| trust_forwarded && !v.is_empty());

        if let Some(ip) = forwarded {
            return Self(ip.to_string());
        }

        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| Self(addr.ip().to_string()))
            .unwrap_or_else(|| Self("unknown".to_string()))
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for ClientAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state.config.trust_forwarded_for))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn forwarded_for_first_hop_behind_proxy() {
        let p = parts(Request::builder().header("X-Forwarded-For", "10.0.0.1, 172.16.0.1"));
        assert_eq!(ClientAddr::from_parts(&p, true), ClientAddr("10.0.0.1".into()));
    }

    #[test]
    fn forwarded_for_ignored_without_proxy() {
        let mut p = parts(Request::builder().header("X-Forwarded-For", "10.0.0.1"));
        assert_eq!(ClientAddr::from_parts(&p, false).0, "unknown");

        p.extensions.insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 9], 5000))));
        assert_eq!(ClientAddr::from_parts(&p, false).0, "192.168.1.9");
    }

    #[test]
    fn falls_back_to_peer_then_unknown() {
        let mut p = parts(Request::builder());
        assert_eq!(ClientAddr::from_parts(&p, true).0, "unknown");

        p.extensions.insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 9], 5000))));
        assert_eq!(ClientAddr::from_parts(&p, true).0, "192.168.1.9");
    }
}
