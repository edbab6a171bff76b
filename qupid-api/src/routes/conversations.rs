use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, Paginated, PaginationParams};

use crate::extractors::CurrentUser;
use crate::models::{Conversation, Message, User};
use crate::schema::{conversation_members, conversations, messages};
use crate::services::chat_service::{self, MessageView};
use crate::services::relations;
use crate::services::views::{project_summary, UserSummary};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub user_id: Uuid,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub conversation_type: String,
    pub title: Option<String>,
    pub partner: Option<UserSummary>,
    pub last_message: Option<MessageView>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub conversation_id: Uuid,
    pub marked_read: usize,
}

/// Incoming unread messages in one conversation.
fn unread_in(conn: &mut PgConnection, conversation_id: Uuid, me: Uuid) -> AppResult<i64> {
    let count = messages::table
        .filter(messages::conversation_id.eq(conversation_id))
        .filter(messages::sender_id.ne(me))
        .filter(messages::is_read.eq(false))
        .count()
        .get_result::<i64>(conn)?;
    Ok(count)
}

fn member_of(conn: &mut PgConnection, me: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = conversation_members::table
        .filter(conversation_members::user_id.eq(me))
        .select(conversation_members::conversation_id)
        .load::<Uuid>(conn)?;
    Ok(ids)
}

/// Builds list/detail views: partner card, newest message and unread count.
fn render(conn: &mut PgConnection, me: &User, conversations: Vec<Conversation>) -> AppResult<Vec<ConversationView>> {
    let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let partner_rows: Vec<(Uuid, Uuid)> = conversation_members::table
        .filter(conversation_members::conversation_id.eq_any(&ids))
        .filter(conversation_members::user_id.ne(me.id))
        .select((conversation_members::conversation_id, conversation_members::user_id))
        .load(conn)?;
    let partner_ids: Vec<Uuid> = partner_rows.iter().map(|(_, u)| *u).collect();
    let people = relations::users_by_id(conn, &partner_ids)?;
    let partners: HashMap<Uuid, Uuid> = partner_rows.into_iter().collect();

    let recent: Vec<Message> = messages::table
        .filter(messages::conversation_id.eq_any(&ids))
        .distinct_on(messages::conversation_id)
        .order((messages::conversation_id, messages::created_at.desc()))
        .load(conn)?;
    let mut last: HashMap<Uuid, Message> = recent.into_iter().map(|m| (m.conversation_id, m)).collect();

    let unread_rows: Vec<(Uuid, i64)> = messages::table
        .filter(messages::conversation_id.eq_any(&ids))
        .filter(messages::sender_id.ne(me.id))
        .filter(messages::is_read.eq(false))
        .group_by(messages::conversation_id)
        .select((messages::conversation_id, diesel::dsl::count(messages::id)))
        .load(conn)?;
    let unread: HashMap<Uuid, i64> = unread_rows.into_iter().collect();

    Ok(conversations
        .into_iter()
        .map(|c| {
            let partner = partners.get(&c.id).and_then(|id| people.get(id));
            let last_message = last.remove(&c.id).map(|m| {
                let sender_name = if m.sender_id == me.id {
                    Some(me.display_name.clone())
                } else {
                    partner.map(|p| p.display_name.clone())
                };
                MessageView::new(m, sender_name)
            });
            ConversationView {
                partner: partner.map(project_summary),
                last_message,
                unread_count: unread.get(&c.id).copied().unwrap_or(0),
                id: c.id,
                conversation_type: c.conversation_type,
                title: c.title,
                created_at: c.created_at,
                updated_at: c.updated_at,
            }
        })
        .collect())
}

// --- GET /conversations ---

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<ConversationView>>>> {
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let mine = member_of(&mut conn, me.id)?;
    let total = mine.len() as i64;
    let rows = conversations::table
        .filter(conversations::id.eq_any(&mine))
        .order(conversations::updated_at.desc())
        .limit(page.limit)
        .offset(page.offset)
        .load::<Conversation>(&mut conn)?;

    let items = render(&mut conn, &me, rows)?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &page))))
}

// --- POST /conversations ---

/// Opens (or returns) the direct conversation with a matched, unblocked user.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<CreateConversationRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ConversationView>>)> {
    if req.user_id == me.id {
        return Err(AppError::new(ErrorCode::CannotMessageSelf, "cannot start a conversation with yourself"));
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let other = relations::find_active_user(&mut conn, req.user_id)?;
    relations::ensure_not_blocked(&mut conn, me.id, other.id)?;
    if !relations::like_status(&mut conn, me.id, other.id)?.is_matched {
        return Err(AppError::new(ErrorCode::NotMatched, "you can only message users you have matched with"));
    }

    let (conversation, created) = chat_service::get_or_create_direct(&mut conn, me.id, other.id)?;
    if created {
        tracing::info!(conversation_id = %conversation.id, user_id = %me.id, other_id = %other.id, "conversation created");
    }

    let view = render(&mut conn, &me, vec![conversation])?
        .pop()
        .ok_or_else(|| AppError::internal("conversation vanished while rendering"))?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(ApiResponse::ok(view))))
}

// --- GET /conversations/:id ---

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ConversationView>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let conversation = chat_service::verify_membership(&mut conn, conversation_id, me.id)?;
    let view = render(&mut conn, &me, vec![conversation])?
        .pop()
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))?;

    Ok(Json(ApiResponse::ok(view)))
}

// --- GET /conversations/unread-count ---

pub async fn total_unread(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<ApiResponse<UnreadCount>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let mine = member_of(&mut conn, me.id)?;
    let unread_count = messages::table
        .filter(messages::conversation_id.eq_any(&mine))
        .filter(messages::sender_id.ne(me.id))
        .filter(messages::is_read.eq(false))
        .count()
        .get_result::<i64>(&mut conn)?;

    Ok(Json(ApiResponse::ok(UnreadCount { conversation_id: None, unread_count })))
}

// --- GET /conversations/:id/unread-count ---

pub async fn conversation_unread(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<UnreadCount>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    chat_service::verify_membership(&mut conn, conversation_id, me.id)?;
    let unread_count = unread_in(&mut conn, conversation_id, me.id)?;

    Ok(Json(ApiResponse::ok(UnreadCount { conversation_id: Some(conversation_id), unread_count })))
}

// --- PUT /conversations/:id/read ---

pub async fn mark_conversation_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MarkedRead>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    chat_service::verify_membership(&mut conn, conversation_id, me.id)?;
    let marked_read = diesel::update(
        messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .filter(messages::sender_id.ne(me.id))
            .filter(messages::is_read.eq(false)),
    )
    .set(messages::is_read.eq(true))
    .execute(&mut conn)?;

    tracing::debug!(conversation_id = %conversation_id, user_id = %me.id, marked_read, "conversation marked read");

    Ok(Json(ApiResponse::ok(MarkedRead { conversation_id, marked_read })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_unread_omits_conversation_id() {
        let json = serde_json::to_value(UnreadCount { conversation_id: None, unread_count: 3 }).unwrap();
        assert!(json.get("conversation_id").is_none());
        assert_eq!(json["unread_count"], 3);
    }
}
