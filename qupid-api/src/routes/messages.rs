use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, Paginated, PaginationParams};

use crate::extractors::CurrentUser;
use crate::models::{Message, MessageType, NewMessage};
use crate::realtime::frames::ServerFrame;
use crate::schema::{conversations, messages, users};
use crate::services::chat_service::{self, MessageView, MAX_MESSAGE_LEN};
use crate::services::relations;
use crate::services::uploads::UploadKind;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration_seconds: Option<i32>,
}

impl SendMessageRequest {
    /// Text needs 1..=4000 characters. Voice and image need a file path in the
    /// matching upload directory; their caption may be empty.
    fn check(&self) -> AppResult<()> {
        let len = self.content.trim().chars().count();
        if len > MAX_MESSAGE_LEN {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                format!("message must be at most {MAX_MESSAGE_LEN} characters"),
            ));
        }

        let expected_dir = match self.message_type {
            MessageType::Text => {
                if len == 0 {
                    return Err(AppError::new(ErrorCode::ValidationError, "message content cannot be empty"));
                }
                return Ok(());
            }
            MessageType::Voice => UploadKind::Voice.directory(),
            MessageType::Image => UploadKind::Image.directory(),
        };

        let path = self
            .file_path
            .as_deref()
            .map(|p| p.trim_start_matches('/'))
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "file_path is required for media messages"))?;
        if !path.starts_with(&format!("{expected_dir}/")) {
            return Err(AppError::new(
                ErrorCode::InvalidFilePath,
                format!("{} messages must reference a file under {expected_dir}/", self.message_type.as_str()),
            ));
        }
        if self.file_size.is_some_and(|s| s < 0) || self.duration_seconds.is_some_and(|d| d < 0) {
            return Err(AppError::new(ErrorCode::ValidationError, "file size and duration must be >= 0"));
        }
        Ok(())
    }
}

// --- GET /conversations/:id/messages ---

/// Newest page first in the query, returned oldest first for display.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(conversation_id): Path<Uuid>,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<MessageView>>>> {
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    chat_service::verify_membership(&mut conn, conversation_id, me.id)?;

    let total = messages::table
        .filter(messages::conversation_id.eq(conversation_id))
        .count()
        .get_result::<i64>(&mut conn)?;
    let mut rows: Vec<(Message, String)> = messages::table
        .inner_join(users::table)
        .filter(messages::conversation_id.eq(conversation_id))
        .order(messages::created_at.desc())
        .limit(page.limit)
        .offset(page.offset)
        .select((messages::all_columns, users::display_name))
        .load(&mut conn)?;
    rows.reverse();

    let items = rows
        .into_iter()
        .map(|(message, sender_name)| MessageView::new(message, Some(sender_name)))
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &page))))
}

// --- POST /conversations/:id/messages ---

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<MessageView>>)> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let conversation = chat_service::verify_membership(&mut conn, conversation_id, me.id)?;
    req.check()?;

    let file_path = match (req.message_type, req.file_path.as_deref()) {
        (MessageType::Text, _) | (_, None) => None,
        (_, Some(path)) => {
            let relative = path.trim_start_matches('/').to_string();
            state.uploads.resolve(&relative)?;
            if !state.uploads.exists(&relative).await {
                return Err(AppError::new(ErrorCode::FileNotFound, "referenced file does not exist"));
            }
            Some(relative)
        }
    };

    if conversation.conversation_type == "direct" {
        if let Some(other) = chat_service::counterpart(&mut conn, conversation.id, me.id)? {
            relations::ensure_not_blocked(&mut conn, me.id, other)?;
        }
    }

    let new_message = NewMessage {
        conversation_id: conversation.id,
        sender_id: me.id,
        content: req.content.trim().to_string(),
        message_type: req.message_type.as_str().to_string(),
        file_size: file_path.as_ref().and(req.file_size),
        duration_seconds: file_path.as_ref().and(req.duration_seconds),
        file_path,
    };

    let message = conn.transaction::<_, AppError, _>(|conn| {
        let message = diesel::insert_into(messages::table)
            .values(&new_message)
            .get_result::<Message>(conn)?;
        diesel::update(conversations::table.find(conversation.id))
            .set(conversations::updated_at.eq(Utc::now()))
            .execute(conn)?;
        Ok(message)
    })?;

    metrics::counter!("messages_sent_total", "type" => req.message_type.as_str()).increment(1);
    tracing::info!(
        message_id = %message.id,
        conversation_id = %conversation.id,
        sender_id = %me.id,
        message_type = req.message_type.as_str(),
        "message sent"
    );

    let view = MessageView::new(message, Some(me.display_name.clone()));
    let members = chat_service::member_ids(&mut conn, conversation.id)?;
    chat_service::notify_members(
        state.connections.as_ref(),
        &members,
        &ServerFrame::Message { conversation_id: conversation.id, message: view.notice() },
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

// --- PUT /conversations/:id/messages/:message_id/read ---

pub async fn mark_message_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path((conversation_id, message_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<MessageView>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    chat_service::verify_membership(&mut conn, conversation_id, me.id)?;

    let (message, sender_name): (Message, String) = messages::table
        .inner_join(users::table)
        .filter(messages::id.eq(message_id))
        .filter(messages::conversation_id.eq(conversation_id))
        .select((messages::all_columns, users::display_name))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "message not found"))?;

    if message.sender_id == me.id {
        return Err(AppError::new(ErrorCode::CannotMarkOwnMessage, "cannot mark your own message as read"));
    }

    let message = if message.is_read {
        message
    } else {
        diesel::update(messages::table.find(message.id))
            .set(messages::is_read.eq(true))
            .get_result::<Message>(&mut conn)?
    };

    Ok(Json(ApiResponse::ok(MessageView::new(message, Some(sender_name)))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn request(message_type: MessageType, content: &str, file_path: Option<&str>) -> SendMessageRequest {
        SendMessageRequest {
            content: content.to_string(),
            message_type,
            file_path: file_path.map(str::to_string),
            file_size: None,
            duration_seconds: None,
        }
    }

    #[test]
    fn text_needs_content_within_limit() {
        assert!(request(MessageType::Text, "hello", None).check().is_ok());
        assert!(request(MessageType::Text, "   ", None).check().is_err());
        assert!(request(MessageType::Text, &"a".repeat(MAX_MESSAGE_LEN), None).check().is_ok());
        assert!(request(MessageType::Text, &"a".repeat(MAX_MESSAGE_LEN + 1), None).check().is_err());
    }

    #[test]
    fn media_needs_path_in_matching_directory() {
        assert!(request(MessageType::Voice, "", None).check().is_err());
        assert!(request(MessageType::Voice, "", Some("voice/a_b.ogg")).check().is_ok());
        assert!(request(MessageType::Image, "look", Some("/images/a_b.png")).check().is_ok());

        let wrong = request(MessageType::Image, "", Some("voice/a_b.ogg")).check().unwrap_err();
        assert_eq!(wrong.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn message_type_defaults_to_text() {
        let req: SendMessageRequest = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(req.message_type, MessageType::Text);
    }
}
