use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::DatabaseErrorKind;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth errors
/// - E2xxx: Profile, tag and matching errors
/// - E4xxx: Chat errors
/// - E5xxx: File errors
/// - E6xxx: Moderation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    ServiceUnavailable,
    BadRequest,
    PayloadTooLarge,
    DuplicateEntry,

    // Auth (E1xxx)
    InvalidCredentials,
    EmailAlreadyExists,
    EmailDomainNotAllowed,
    TokenExpired,
    TokenInvalid,
    PasswordTooWeak,
    VerificationCodeInvalid,
    EmailRateLimited,
    AccountDisabled,
    AdminRequired,

    // Profile / matching (E2xxx)
    UserNotFound,
    TagNotFound,
    TagAlreadyExists,
    TagAlreadyAdded,
    CannotLikeSelf,
    AlreadyLiked,
    LikeNotFound,
    CannotSkipSelf,
    AlreadySkipped,
    SkipNotFound,
    CannotBlockSelf,
    AlreadyBlocked,
    BlockNotFound,
    UserBlocked,
    NotMatched,

    // Chat (E4xxx)
    ConversationNotFound,
    NotConversationMember,
    MessageNotFound,
    CannotMarkOwnMessage,
    CannotMessageSelf,

    // Files (E5xxx)
    FileNotFound,
    InvalidFileType,
    InvalidFilePath,
    EmptyFile,

    // Moderation (E6xxx)
    ReportNotFound,
    CannotReportSelf,
    DuplicateReport,
    InvalidReportTransition,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::RateLimited => "E0006",
            Self::ServiceUnavailable => "E0007",
            Self::BadRequest => "E0008",
            Self::PayloadTooLarge => "E0009",
            Self::DuplicateEntry => "E0010",

            // Auth
            Self::InvalidCredentials => "E1001",
            Self::EmailAlreadyExists => "E1002",
            Self::EmailDomainNotAllowed => "E1003",
            Self::TokenExpired => "E1004",
            Self::TokenInvalid => "E1005",
            Self::PasswordTooWeak => "E1006",
            Self::VerificationCodeInvalid => "E1007",
            Self::EmailRateLimited => "E1008",
            Self::AccountDisabled => "E1009",
            Self::AdminRequired => "E1010",

            // Profile / matching
            Self::UserNotFound => "E2001",
            Self::TagNotFound => "E2002",
            Self::TagAlreadyExists => "E2003",
            Self::TagAlreadyAdded => "E2004",
            Self::CannotLikeSelf => "E2005",
            Self::AlreadyLiked => "E2006",
            Self::LikeNotFound => "E2007",
            Self::CannotSkipSelf => "E2008",
            Self::AlreadySkipped => "E2009",
            Self::SkipNotFound => "E2010",
            Self::CannotBlockSelf => "E2011",
            Self::AlreadyBlocked => "E2012",
            Self::BlockNotFound => "E2013",
            Self::UserBlocked => "E2014",
            Self::NotMatched => "E2015",

            // Chat
            Self::ConversationNotFound => "E4001",
            Self::NotConversationMember => "E4002",
            Self::MessageNotFound => "E4003",
            Self::CannotMarkOwnMessage => "E4004",
            Self::CannotMessageSelf => "E4005",

            // Files
            Self::FileNotFound => "E5001",
            Self::InvalidFileType => "E5002",
            Self::InvalidFilePath => "E5003",
            Self::EmptyFile => "E5004",

            // Moderation
            Self::ReportNotFound => "E6001",
            Self::CannotReportSelf => "E6002",
            Self::DuplicateReport => "E6003",
            Self::InvalidReportTransition => "E6004",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::ServiceUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError | Self::PasswordTooWeak => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest | Self::DuplicateEntry | Self::EmailAlreadyExists
            | Self::VerificationCodeInvalid | Self::TagAlreadyExists | Self::TagAlreadyAdded
            | Self::CannotLikeSelf | Self::AlreadyLiked | Self::CannotSkipSelf
            | Self::AlreadySkipped | Self::CannotBlockSelf | Self::AlreadyBlocked
            | Self::CannotMarkOwnMessage | Self::CannotMessageSelf | Self::InvalidFileType
            | Self::EmptyFile | Self::CannotReportSelf | Self::DuplicateReport
            | Self::InvalidReportTransition => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::UserNotFound | Self::TagNotFound | Self::LikeNotFound
            | Self::SkipNotFound | Self::BlockNotFound | Self::ConversationNotFound
            | Self::MessageNotFound | Self::FileNotFound | Self::ReportNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::InvalidCredentials | Self::TokenExpired
            | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::EmailDomainNotAllowed | Self::AccountDisabled
            | Self::AdminRequired | Self::UserBlocked | Self::NotMatched
            | Self::NotConversationMember | Self::InvalidFilePath => StatusCode::FORBIDDEN,
            Self::RateLimited | Self::EmailRateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Rate limit rejection carrying the `Retry-After` hint.
    pub fn rate_limited(code: ErrorCode, retry_after_secs: u64) -> Self {
        Self::with_details(
            code,
            format!("rate limit exceeded, retry in {retry_after_secs} seconds"),
            serde_json::json!({ "retry_after_secs": retry_after_secs }),
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Known { code, .. } => code.status_code(),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(err) => database_status(err).0,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

fn database_status(err: &diesel::result::Error) -> (StatusCode, &'static str, &'static str) {
    match err {
        diesel::result::Error::NotFound => (StatusCode::NOT_FOUND, "E0003", "resource not found"),
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            (StatusCode::BAD_REQUEST, "E0010", "resource already exists")
        }
        diesel::result::Error::DatabaseError(DatabaseErrorKind::CheckViolation, _) => {
            (StatusCode::BAD_REQUEST, "E0008", "request violates a constraint")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "E0001", "database error"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    retry_after = d.get("retry_after_secs").and_then(|v| v.as_u64());
                    resp = resp.with_details(d.clone());
                }
                if status.is_server_error() {
                    tracing::error!(code = code.code(), error = %message, "request failed");
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                let (status, code, message) = database_status(err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "database error");
                } else {
                    tracing::debug!(error = %err, "database constraint rejected request");
                }
                (status, ApiErrorResponse::new(code, message))
            }
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        let mut response = (status, Json(error_response)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;
