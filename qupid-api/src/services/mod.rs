pub mod auth_service;
pub mod candidates;
pub mod chat_service;
pub mod email_service;
pub mod matching;
pub mod moderation;
pub mod rate_limiter;
pub mod relations;
pub mod token_service;
pub mod uploads;
pub mod verification;
pub mod views;
