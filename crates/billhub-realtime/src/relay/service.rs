//! Message relay: persist through the store, then fan out to live connections.

use std::sync::Arc;

use tracing::{debug, info, warn};

use billhub_core::error::AppError;
use billhub_core::result::AppResult;
use billhub_core::types::id::{BookingId, ConnectionId, MessageId, UserId};
use billhub_entity::message::{Message, NewMessage};
use billhub_store::MessageStore;

use crate::connection::registry::ConnectionRegistry;
use crate::message::types::OutboundEvent;
use crate::message::validator::validate_content;
use crate::metrics::RealtimeMetrics;

/// Relays chat messages and read receipts.
///
/// Nothing is pushed until the store call has returned, so delivery order
/// for a pair of users follows persistence order.
#[derive(Debug)]
pub struct MessageRelay {
    /// Live connections.
    registry: Arc<ConnectionRegistry>,
    /// Persistence and authorization.
    store: Arc<dyn MessageStore>,
    /// Content limit in characters.
    max_content_length: usize,
    /// Metrics.
    metrics: Arc<RealtimeMetrics>,
}

impl MessageRelay {
    /// Creates a relay over the given store.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn MessageStore>,
        max_content_length: usize,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            registry,
            store,
            max_content_length,
            metrics,
        }
    }

    /// Persists a message sent from `origin` and delivers it.
    ///
    /// Pushes, in order: `message:new` and `unread:count` to every receiver
    /// connection, `message:new` to the sender's other connections, and
    /// `message:sent` to `origin`.
    pub async fn send(
        &self,
        origin: ConnectionId,
        receiver_id: UserId,
        content: String,
        booking_id: Option<BookingId>,
    ) -> AppResult<Message> {
        let sender_id = self.sender_of(origin)?;
        if receiver_id.is_nil() {
            return Err(AppError::validation("receiverId must not be empty"));
        }
        if booking_id.is_some_and(|id| id.is_nil()) {
            return Err(AppError::validation("bookingId must not be empty"));
        }
        validate_content(&content, self.max_content_length)?;

        let message = self
            .store
            .create_message(NewMessage {
                sender_id,
                receiver_id,
                content,
                booking_id,
            })
            .await?;
        self.metrics.message_relayed();

        let delivered = self
            .registry
            .send_to_user(receiver_id, &OutboundEvent::MessageNew(message.clone()));
        if delivered > 0 {
            self.push_unread_count(receiver_id).await;
        }

        let mirrored = self.registry.send_to_user_except(
            sender_id,
            Some(origin),
            &OutboundEvent::MessageNew(message.clone()),
        );
        self.registry
            .send_to_connection(origin, OutboundEvent::MessageSent(message.clone()));

        info!(
            message_id = %message.id,
            sender_id = %sender_id,
            receiver_id = %receiver_id,
            delivered,
            mirrored,
            "Message relayed"
        );
        Ok(message)
    }

    /// Marks one message read on behalf of the connection's user.
    pub async fn mark_read(&self, origin: ConnectionId, message_id: MessageId) -> AppResult<Message> {
        let reader = self.sender_of(origin)?;
        if message_id.is_nil() {
            return Err(AppError::validation("messageId must not be empty"));
        }

        let message = self.store.mark_read(reader, message_id).await?;
        debug!(message_id = %message_id, reader = %reader, "Message marked read");
        self.push_unread_count(reader).await;
        Ok(message)
    }

    /// Marks everything from `partner_id` to the connection's user as read.
    pub async fn mark_conversation_read(
        &self,
        origin: ConnectionId,
        partner_id: UserId,
    ) -> AppResult<u64> {
        let reader = self.sender_of(origin)?;
        if partner_id.is_nil() {
            return Err(AppError::validation("partnerId must not be empty"));
        }

        let flipped = self.store.mark_conversation_read(reader, partner_id).await?;
        debug!(reader = %reader, partner_id = %partner_id, flipped, "Conversation marked read");
        self.push_unread_count(reader).await;
        Ok(flipped)
    }

    fn sender_of(&self, origin: ConnectionId) -> AppResult<UserId> {
        self.registry
            .user_of(origin)
            .ok_or_else(|| AppError::authentication("Connection is not registered"))
    }

    async fn push_unread_count(&self, user_id: UserId) {
        match self.store.unread_count(user_id).await {
            Ok(count) => {
                self.registry
                    .send_to_user(user_id, &OutboundEvent::UnreadCount { count });
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load unread count");
            }
        }
    }
}
