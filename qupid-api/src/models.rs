use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{
    blocks, conversation_members, conversations, email_verifications, likes, messages, reports,
    skips, tags, user_tags, users,
};

// --- User ---

/// Full user row. Never serialized directly: responses go through
/// `services::views` so privacy flags are always applied.
#[derive(Debug, Queryable, Identifiable, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub hashed_password: Option<String>,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub campus: Option<String>,
    pub faculty: Option<String>,
    pub grade: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub gender: Option<String>,
    pub sexuality: Option<String>,
    pub looking_for: Option<String>,
    pub show_campus: bool,
    pub show_faculty: bool,
    pub show_grade: bool,
    pub show_birthday: bool,
    pub show_age: bool,
    pub show_gender: bool,
    pub show_sexuality: bool,
    pub show_looking_for: bool,
    pub show_bio: bool,
    pub show_tags: bool,
    pub is_active: bool,
    pub is_admin: bool,
    pub profile_completed: bool,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: Option<String>,
    pub display_name: String,
}

#[derive(Debug, AsChangeset, Deserialize, Default)]
#[diesel(table_name = users)]
pub struct UpdateProfile {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub campus: Option<String>,
    pub faculty: Option<String>,
    pub grade: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub gender: Option<String>,
    pub sexuality: Option<String>,
    pub looking_for: Option<String>,
    pub profile_completed: Option<bool>,
}

#[derive(Debug, AsChangeset, Deserialize, Serialize, Default, Clone)]
#[diesel(table_name = users)]
pub struct UpdatePrivacy {
    pub show_campus: Option<bool>,
    pub show_faculty: Option<bool>,
    pub show_grade: Option<bool>,
    pub show_birthday: Option<bool>,
    pub show_age: Option<bool>,
    pub show_gender: Option<bool>,
    pub show_sexuality: Option<bool>,
    pub show_looking_for: Option<bool>,
    pub show_bio: Option<bool>,
    pub show_tags: Option<bool>,
}

impl UpdatePrivacy {
    pub fn is_empty(&self) -> bool {
        [
            self.show_campus, self.show_faculty, self.show_grade, self.show_birthday,
            self.show_age, self.show_gender, self.show_sexuality, self.show_looking_for,
            self.show_bio, self.show_tags,
        ]
        .iter()
        .all(Option::is_none)
    }
}

// --- Tag ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = tags)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tags)]
pub struct NewTag {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Queryable, Identifiable)]
#[diesel(table_name = user_tags)]
pub struct UserTag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tag_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_tags)]
pub struct NewUserTag {
    pub user_id: Uuid,
    pub tag_id: Uuid,
}

// --- Like / Skip / Block ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = likes)]
pub struct Like {
    pub id: Uuid,
    pub liker_id: Uuid,
    pub liked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = likes)]
pub struct NewLike {
    pub liker_id: Uuid,
    pub liked_id: Uuid,
}

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = skips)]
pub struct Skip {
    pub id: Uuid,
    pub skipper_id: Uuid,
    pub skipped_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = skips)]
pub struct NewSkip {
    pub skipper_id: Uuid,
    pub skipped_id: Uuid,
}

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = blocks)]
pub struct Block {
    pub id: Uuid,
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = blocks)]
pub struct NewBlock {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
}

// --- Report ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = reports)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub reason: String,
    pub status: String,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reports)]
pub struct NewReport {
    pub reporter_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub reason: String,
    pub status: String,
}

// --- Conversation ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: Uuid,
    pub conversation_type: String,
    pub title: Option<String>,
    #[serde(skip)]
    pub direct_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation {
    pub conversation_type: String,
    pub title: Option<String>,
    pub direct_key: Option<String>,
}

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = conversation_members)]
pub struct ConversationMember {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversation_members)]
pub struct NewConversationMember {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

// --- Message ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Voice,
    Image,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Voice => "voice",
            MessageType::Image => "image",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "voice" => Ok(MessageType::Voice),
            "image" => Ok(MessageType::Image),
            _ => Err(format!("unknown message type: {s}")),
        }
    }
}

#[derive(Debug, Queryable, Identifiable, Clone)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration_seconds: Option<i32>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration_seconds: Option<i32>,
}

// --- Email verification ---

#[derive(Debug, Queryable, Identifiable, Clone)]
#[diesel(table_name = email_verifications)]
pub struct EmailVerification {
    pub id: Uuid,
    pub email: String,
    pub verification_code: String,
    pub is_used: bool,
    pub expires_at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl EmailVerification {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = email_verifications)]
pub struct NewEmailVerification {
    pub email: String,
    pub verification_code: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
}
