use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Conversation, Message, MessageType, NewConversation, NewConversationMember};
use crate::realtime::directory::ConnectionDirectory;
use crate::realtime::frames::{MessageNotice, ServerFrame};
use crate::schema::{conversation_members, conversations};

pub const MAX_MESSAGE_LEN: usize = 4000;

/// Order-independent key identifying the direct conversation of two users.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", low.simple(), high.simple())
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub sender_name: Option<String>,
    pub message_type: MessageType,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration_seconds: Option<i32>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn new(message: Message, sender_name: Option<String>) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            message_type: message.message_type.parse().unwrap_or_default(),
            content: message.content,
            sender_id: message.sender_id,
            sender_name,
            file_path: message.file_path,
            file_size: message.file_size,
            duration_seconds: message.duration_seconds,
            is_read: message.is_read,
            created_at: message.created_at,
        }
    }

    pub fn notice(&self) -> MessageNotice {
        MessageNotice {
            id: Some(self.id),
            sender_id: self.sender_id,
            sender_name: self.sender_name.clone(),
            content: self.content.clone(),
            message_type: self.message_type,
            file_path: self.file_path.clone(),
            created_at: self.created_at,
        }
    }
}

/// Loads the conversation, failing with 404 when it does not exist and 403
/// when the user is not a member.
pub fn verify_membership(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    user_id: Uuid,
) -> AppResult<Conversation> {
    let conversation = conversations::table
        .find(conversation_id)
        .first::<Conversation>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))?;

    let is_member = conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .filter(conversation_members::user_id.eq(user_id))
        .count()
        .get_result::<i64>(conn)?
        > 0;

    if !is_member {
        return Err(AppError::new(
            ErrorCode::NotConversationMember,
            "you are not a member of this conversation",
        ));
    }

    Ok(conversation)
}

pub fn member_ids(conn: &mut PgConnection, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .select(conversation_members::user_id)
        .load::<Uuid>(conn)?;
    Ok(ids)
}

/// Returns the direct conversation between two users, creating it and both
/// memberships on first use. The unique `direct_key` settles concurrent creates.
pub fn get_or_create_direct(
    conn: &mut PgConnection,
    me: Uuid,
    other: Uuid,
) -> AppResult<(Conversation, bool)> {
    let key = direct_key(me, other);

    conn.transaction::<_, AppError, _>(|conn| {
        let existing = conversations::table
            .filter(conversations::direct_key.eq(&key))
            .first::<Conversation>(conn)
            .optional()?;
        if let Some(conversation) = existing {
            return Ok((conversation, false));
        }

        let inserted = diesel::insert_into(conversations::table)
            .values(&NewConversation {
                conversation_type: "direct".to_string(),
                title: None,
                direct_key: Some(key.clone()),
            })
            .on_conflict(conversations::direct_key)
            .do_nothing()
            .get_result::<Conversation>(conn)
            .optional()?;

        match inserted {
            Some(conversation) => {
                let members = [me, other].map(|user_id| NewConversationMember {
                    conversation_id: conversation.id,
                    user_id,
                });
                diesel::insert_into(conversation_members::table)
                    .values(&members[..])
                    .on_conflict_do_nothing()
                    .execute(conn)?;
                Ok((conversation, true))
            }
            None => {
                let conversation = conversations::table
                    .filter(conversations::direct_key.eq(&key))
                    .first::<Conversation>(conn)?;
                Ok((conversation, false))
            }
        }
    })
}

/// The other participant of a direct conversation.
pub fn counterpart(conn: &mut PgConnection, conversation_id: Uuid, me: Uuid) -> AppResult<Option<Uuid>> {
    let other = conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .filter(conversation_members::user_id.ne(me))
        .select(conversation_members::user_id)
        .first::<Uuid>(conn)
        .optional()?;
    Ok(other)
}

/// Fire-and-forget fan-out to every connected member.
pub fn notify_members(directory: &dyn ConnectionDirectory, members: &[Uuid], frame: &ServerFrame) -> usize {
    let delivered = directory.broadcast(members, frame);
    tracing::debug!(members = members.len(), delivered, "realtime notification pushed");
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::directory::InMemoryDirectory;
    use tokio::sync::mpsc;

    #[test]
    fn direct_key_is_symmetric() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(direct_key(a, b), direct_key(b, a));
        assert_ne!(direct_key(a, b), direct_key(a, Uuid::new_v4()));
        assert!(direct_key(a, b).len() <= 80);
    }

    #[test]
    fn message_view_from_row() {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "voice memo".into(),
            message_type: "voice".into(),
            file_path: Some("voice/x.ogg".into()),
            file_size: Some(2048),
            duration_seconds: Some(7),
            is_read: false,
            created_at: Utc::now(),
        };
        let view = MessageView::new(message.clone(), Some("Aki".into()));
        assert_eq!(view.message_type, MessageType::Voice);
        let notice = view.notice();
        assert_eq!(notice.id, Some(message.id));
        assert_eq!(notice.file_path.as_deref(), Some("voice/x.ogg"));
    }

    #[test]
    fn notify_reaches_sender_devices_too() {
        let dir = InMemoryDirectory::new();
        let (sender, recipient) = (Uuid::new_v4(), Uuid::new_v4());
        let (ts, mut rs) = mpsc::unbounded_channel();
        let (tr, mut rr) = mpsc::unbounded_channel();
        dir.register(sender, ts);
        dir.register(recipient, tr);

        assert_eq!(notify_members(&dir, &[sender, recipient], &ServerFrame::Pong), 2);
        assert!(rs.try_recv().is_ok());
        assert!(rr.try_recv().is_ok());
    }
}
