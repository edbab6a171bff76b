//! One live `/ws` connection: registration, presence, frame handling and
//! cleanup.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use diesel::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use qupid_shared::errors::{AppError, AppResult};

use crate::models::MessageType;
use crate::realtime::directory::FrameSender;
use crate::realtime::frames::{parse_client_frame, ClientFrame, MessageNotice, ServerFrame};
use crate::schema::users;
use crate::services::chat_service::{self, MAX_MESSAGE_LEN};
use crate::AppState;

pub async fn run(state: Arc<AppState>, user_id: Uuid, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let connection = state.connections.register(user_id, tx.clone());
    if let Err(e) = set_presence(&state, user_id, true) {
        tracing::warn!(user_id = %user_id, error = %e, "failed to mark user online");
    }
    let _ = tx.send(ServerFrame::connected(user_id));
    tracing::info!(user_id = %user_id, connection_id = %connection, "websocket connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(incoming) = stream.next().await {
        match incoming {
            Ok(Message::Text(text)) => handle_text(&state, user_id, &tx, &text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(user_id = %user_id, error = %e, "websocket receive error");
                break;
            }
        }
    }

    let remaining = state.connections.unregister(user_id, connection);
    drop(tx);
    writer.abort();

    if remaining == 0 {
        if let Err(e) = set_presence(&state, user_id, false) {
            tracing::warn!(user_id = %user_id, error = %e, "failed to mark user offline");
        }
    }
    tracing::info!(user_id = %user_id, connection_id = %connection, remaining, "websocket disconnected");
}

/// Online also refreshes `last_seen_at`; going offline stamps it.
fn set_presence(state: &AppState, user_id: Uuid, online: bool) -> AppResult<()> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    diesel::update(users::table.find(user_id))
        .set((users::is_online.eq(online), users::last_seen_at.eq(Utc::now())))
        .execute(&mut conn)?;
    Ok(())
}

/// Malformed or unauthorized frames are logged and dropped; the socket stays open.
pub(crate) fn handle_text(state: &AppState, user_id: Uuid, reply: &FrameSender, text: &str) {
    let frame = match parse_client_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(user_id = %user_id, error = %e, "ignoring malformed frame");
            return;
        }
    };

    let result = match frame {
        ClientFrame::Ping => {
            let _ = reply.send(ServerFrame::Pong);
            Ok(())
        }
        ClientFrame::Typing { conversation_id, is_typing } => relay_typing(state, user_id, conversation_id, is_typing),
        ClientFrame::Message { conversation_id, content } => relay_message(state, user_id, conversation_id, content),
    };

    if let Err(e) = result {
        tracing::debug!(user_id = %user_id, error = %e, "frame rejected");
    }
}

fn other_members(state: &AppState, user_id: Uuid, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    chat_service::verify_membership(&mut conn, conversation_id, user_id)?;
    let mut members = chat_service::member_ids(&mut conn, conversation_id)?;
    members.retain(|id| *id != user_id);
    Ok(members)
}

fn relay_typing(state: &AppState, user_id: Uuid, conversation_id: Uuid, is_typing: bool) -> AppResult<()> {
    let members = other_members(state, user_id, conversation_id)?;
    let frame = ServerFrame::Typing { conversation_id, user_id, is_typing };
    chat_service::notify_members(state.connections.as_ref(), &members, &frame);
    Ok(())
}

/// Socket messages are relayed live only. Persisted messages go through HTTP.
fn relay_message(state: &AppState, user_id: Uuid, conversation_id: Uuid, content: String) -> AppResult<()> {
    let content = content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::bad_request("message content must be 1-4000 characters"));
    }

    let members = other_members(state, user_id, conversation_id)?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let sender_name = users::table
        .find(user_id)
        .select(users::display_name)
        .first::<String>(&mut conn)
        .optional()?;

    let frame = ServerFrame::Message {
        conversation_id,
        message: MessageNotice {
            id: None,
            sender_id: user_id,
            sender_name,
            content,
            message_type: MessageType::Text,
            file_path: None,
            created_at: Utc::now(),
        },
    };
    chat_service::notify_members(state.connections.as_ref(), &members, &frame);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use qupid_shared::clients::db::create_lazy_pool;
    use qupid_shared::middleware::detached_metrics_handle;

    fn state() -> AppState {
        let config = AppConfig::default();
        let db = create_lazy_pool(&config.database_url);
        AppState::new(config, db, detached_metrics_handle())
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let state = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_text(&state, Uuid::new_v4(), &tx, r#"{"type":"ping"}"#);
        assert_eq!(rx.try_recv().unwrap(), ServerFrame::Pong);
    }

    #[tokio::test]
    async fn garbage_is_ignored() {
        let state = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_text(&state, Uuid::new_v4(), &tx, "not json");
        handle_text(&state, Uuid::new_v4(), &tx, r#"{"type":"dance"}"#);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_relay_is_rejected_before_any_lookup() {
        let state = state();
        let err = relay_message(&state, Uuid::new_v4(), Uuid::new_v4(), "   ".into()).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
