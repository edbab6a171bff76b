use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageType;

/// Frames sent from a client over `/ws`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Ping,
    Typing {
        conversation_id: Uuid,
        #[serde(default = "default_true")]
        is_typing: bool,
    },
    Message {
        conversation_id: Uuid,
        content: String,
    },
}

fn default_true() -> bool {
    true
}

/// Frames pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Connection {
        status: &'static str,
        user_id: Uuid,
    },
    Pong,
    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    Message {
        conversation_id: Uuid,
        message: MessageNotice,
    },
}

/// Message notification. `id` is absent for socket-relayed messages, which
/// are not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageNotice {
    pub id: Option<Uuid>,
    pub sender_id: Uuid,
    pub sender_name: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ServerFrame {
    pub fn connected(user_id: Uuid) -> Self {
        ServerFrame::Connection { status: "connected", user_id }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn parse_client_frame(raw: &str) -> Result<ClientFrame, serde_json::Error> {
    serde_json::from_str(raw)
}
