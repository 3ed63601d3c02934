//! Message entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billhub_core::types::id::{BookingId, MessageId, UserId};

/// A persisted direct message between two marketplace users.
///
/// This is the "full message object" pushed to clients in `message:new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier, assigned by the store.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Addressee.
    pub receiver_id: UserId,
    /// Message body.
    pub content: String,
    /// Booking the conversation is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<BookingId>,
    /// Whether the receiver has read it.
    pub is_read: bool,
    /// When the store persisted it.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The other participant relative to `user`.
    pub fn partner_of(&self, user: UserId) -> UserId {
        if self.sender_id == user {
            self.receiver_id
        } else {
            self.sender_id
        }
    }

    /// Whether `user` is the sender or the receiver.
    pub fn involves(&self, user: UserId) -> bool {
        self.sender_id == user || self.receiver_id == user
    }
}

/// Input to the message store. The sender always comes from the
/// authenticated connection, never from the client payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Author.
    pub sender_id: UserId,
    /// Addressee.
    pub receiver_id: UserId,
    /// Message body.
    pub content: String,
    /// Optional booking association.
    pub booking_id: Option<BookingId>,
}
