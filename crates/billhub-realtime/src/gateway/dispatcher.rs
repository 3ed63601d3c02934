//! Routes inbound frames to the component that owns each event.

use std::sync::Arc;

use tracing::{debug, warn};

use billhub_core::error::AppError;
use billhub_core::result::AppResult;
use billhub_core::types::id::{ConnectionId, UserId};

use crate::connection::handle::ConnectionHandle;
use crate::connection::registry::ConnectionRegistry;
use crate::message::types::{InboundEvent, OutboundEvent, RawFrame};
use crate::message::validator::validate_frame;
use crate::metrics::RealtimeMetrics;
use crate::presence::tracker::PresenceTracker;
use crate::relay::service::MessageRelay;
use crate::typing::coordinator::TypingCoordinator;

/// Stateless router from inbound events to registry, presence, typing and relay.
///
/// Failures are reported to the originating connection only, as an `error`
/// event naming the inbound event when it could be determined.
#[derive(Debug)]
pub struct EventDispatcher {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTracker>,
    typing: Arc<TypingCoordinator>,
    relay: Arc<MessageRelay>,
    metrics: Arc<RealtimeMetrics>,
    /// Inbound frame size limit in bytes.
    max_frame_size: usize,
}

impl EventDispatcher {
    /// Creates a dispatcher over the engine's components.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<PresenceTracker>,
        typing: Arc<TypingCoordinator>,
        relay: Arc<MessageRelay>,
        metrics: Arc<RealtimeMetrics>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            registry,
            presence,
            typing,
            relay,
            metrics,
            max_frame_size,
        }
    }

    /// Handles one text frame received on `conn_id`.
    pub async fn handle_text(&self, conn_id: ConnectionId, raw: &str) {
        let Some(handle) = self.registry.get(conn_id) else {
            warn!(conn_id = %conn_id, "Frame from unknown connection");
            return;
        };

        handle.touch();
        self.metrics.message_received();

        let frame = match validate_frame(raw, self.max_frame_size).and_then(|()| RawFrame::parse(raw))
        {
            Ok(frame) => frame,
            Err(e) => {
                self.reply_error(&handle, &e, None);
                return;
            }
        };

        let event_name = frame.event.clone();
        let result = match InboundEvent::from_frame(frame) {
            Ok(event) => self.dispatch(&handle, event).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.reply_error(&handle, &e, Some(&event_name));
        }
    }

    async fn dispatch(&self, handle: &ConnectionHandle, event: InboundEvent) -> AppResult<()> {
        let sender = handle.user_id;
        debug!(conn_id = %handle.id, event = event.name(), "Dispatching inbound event");

        match event {
            InboundEvent::MessageSend(p) => {
                self.relay
                    .send(handle.id, p.receiver_id, p.content, p.booking_id)
                    .await?;
            }
            InboundEvent::MessageRead(p) => {
                self.relay.mark_read(handle.id, p.message_id).await?;
            }
            InboundEvent::ConversationRead(p) => {
                self.relay
                    .mark_conversation_read(handle.id, p.partner_id)
                    .await?;
            }
            InboundEvent::TypingStart(p) => {
                check_typing_target(sender, p.receiver_id)?;
                self.typing.start(sender, p.receiver_id);
            }
            InboundEvent::TypingStop(p) => {
                check_typing_target(sender, p.receiver_id)?;
                self.typing.stop(sender, p.receiver_id);
            }
            InboundEvent::PresenceCheck(p) => {
                let statuses = self.presence.check_presence(handle.id, &p.user_ids);
                self.registry
                    .send_to_connection(handle.id, OutboundEvent::PresenceStatus { statuses });
            }
            InboundEvent::Pong(_) => {}
        }
        Ok(())
    }

    fn reply_error(&self, handle: &ConnectionHandle, err: &AppError, event: Option<&str>) {
        debug!(
            conn_id = %handle.id,
            code = err.kind.code(),
            event = event.unwrap_or("-"),
            error = %err.message,
            "Inbound event rejected"
        );
        self.metrics.error_sent();
        self.registry
            .send_to_connection(handle.id, OutboundEvent::error(err, event));
    }
}

fn check_typing_target(sender: UserId, receiver: UserId) -> AppResult<()> {
    if receiver.is_nil() {
        return Err(AppError::validation("receiverId must not be empty"));
    }
    if receiver == sender {
        return Err(AppError::validation("Cannot send typing indicator to yourself"));
    }
    Ok(())
}
