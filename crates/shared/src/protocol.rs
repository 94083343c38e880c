use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MessageId, PostId, RoomId, UserId};

/// A confirmed chat message as the server serializes it, both on the live
/// channel broadcast and in history pages. `id` and `sent_at` are assigned
/// by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_room_id: RoomId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_nickname: Option<String>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// The JSON frame a client sends on the live channel. The credential
/// handshake frame is plain text and never takes this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    pub chat_room_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
}

/// One entry in a user's room list, with preview metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_title: Option<String>,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

impl RoomSummary {
    /// The counterpart in a two-party room, from `me`'s point of view.
    pub fn other_party(&self, me: UserId) -> UserId {
        if self.buyer_id == me {
            self.seller_id
        } else {
            self.buyer_id
        }
    }
}
