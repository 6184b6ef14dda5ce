use serde::{Deserialize, Serialize};

use super::timestamp::Timestamp;

/// One message of a transaction's buyer/seller chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub transaction_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub message: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub attachment_url: Option<String>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub is_own_message: Option<bool>,
}

/// Kind of chat message accepted by `/chat/send`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatMessageType {
    Text,
    Image,
}

/// Payload for `/chat/send`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendChatRequest {
    pub transaction_id: i64,
    pub message: String,
    pub message_type: ChatMessageType,
    #[serde(default)]
    pub attachment_url: String,
}

impl SendChatRequest {
    #[must_use]
    pub fn text(transaction_id: i64, message: impl Into<String>) -> Self {
        Self {
            transaction_id,
            message: message.into(),
            message_type: ChatMessageType::Text,
            attachment_url: String::new(),
        }
    }
}
