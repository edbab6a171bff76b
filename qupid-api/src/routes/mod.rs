pub mod admin;
pub mod auth;
pub mod conversations;
pub mod discovery;
pub mod email_auth;
pub mod files;
pub mod health;
pub mod likes;
pub mod messages;
pub mod rate_limit;
pub mod safety;
pub mod skips;
pub mod tags;
pub mod users;
pub mod ws;
