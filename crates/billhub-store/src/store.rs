//! Message persistence trait.

use async_trait::async_trait;

use billhub_core::result::AppResult;
use billhub_core::types::id::{MessageId, UserId};
use billhub_entity::message::{Message, NewMessage};

/// Durable message storage and the authorization rules that guard it.
///
/// Errors carry the caller-facing meaning: `Authorization` when the sender
/// may not message the receiver (e.g. not a party to the booking),
/// `NotFound` for unknown users, bookings or messages, `Validation` for
/// malformed input.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug + 'static {
    /// Authorize and persist a message. Returns it with id and timestamp.
    async fn create_message(&self, new: NewMessage) -> AppResult<Message>;

    /// Mark one message read. Only its receiver may do so.
    async fn mark_read(&self, reader: UserId, message_id: MessageId) -> AppResult<Message>;

    /// Mark every unread message from `partner` to `reader` as read.
    /// Returns how many flipped.
    async fn mark_conversation_read(&self, reader: UserId, partner: UserId) -> AppResult<u64>;

    /// Unread messages addressed to `user`.
    async fn unread_count(&self, user: UserId) -> AppResult<u64>;
}
