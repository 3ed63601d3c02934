//! In-memory message store backed by `DashMap`.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use billhub_core::error::AppError;
use billhub_core::result::AppResult;
use billhub_core::types::id::{BookingId, MessageId, UserId};
use billhub_entity::booking::Booking;
use billhub_entity::message::{Message, NewMessage};

use crate::store::MessageStore;

/// How the store decides whether a user id is resolvable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserDirectory {
    /// Only users added through [`MemoryMessageStore::add_user`] exist.
    Strict,
    /// Any non-nil id exists. Used when identities come from tokens issued elsewhere.
    Open,
}

/// Message store that keeps everything in process memory.
#[derive(Debug)]
pub struct MemoryMessageStore {
    /// Message ID → message.
    messages: DashMap<MessageId, Message>,
    /// Booking ID → booking parties.
    bookings: DashMap<BookingId, Booking>,
    /// Known users (strict mode only).
    users: DashSet<UserId>,
    /// User resolution policy.
    directory: UserDirectory,
}

impl MemoryMessageStore {
    /// Creates a store that only knows users registered via [`Self::add_user`].
    pub fn new() -> Self {
        Self::with_directory(UserDirectory::Strict)
    }

    /// Creates a store that treats every non-nil user id as existing.
    pub fn open() -> Self {
        Self::with_directory(UserDirectory::Open)
    }

    fn with_directory(directory: UserDirectory) -> Self {
        Self {
            messages: DashMap::new(),
            bookings: DashMap::new(),
            users: DashSet::new(),
            directory,
        }
    }

    /// Registers a known user.
    pub fn add_user(&self, user: UserId) {
        self.users.insert(user);
    }

    /// Registers a booking and both of its parties.
    pub fn add_booking(&self, booking: Booking) {
        self.add_user(booking.advertiser_id);
        self.add_user(booking.owner_id);
        self.bookings.insert(booking.id, booking);
    }

    /// Total stored messages.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    fn user_exists(&self, user: UserId) -> bool {
        if user.is_nil() {
            return false;
        }
        match self.directory {
            UserDirectory::Open => true,
            UserDirectory::Strict => self.users.contains(&user),
        }
    }

    fn authorize(&self, new: &NewMessage) -> AppResult<()> {
        if new.content.trim().is_empty() {
            return Err(AppError::validation("Message content must not be empty"));
        }
        if new.sender_id == new.receiver_id {
            return Err(AppError::validation("Cannot send a message to yourself"));
        }
        if !self.user_exists(new.sender_id) {
            return Err(AppError::not_found(format!(
                "User {} not found",
                new.sender_id
            )));
        }
        if !self.user_exists(new.receiver_id) {
            return Err(AppError::not_found(format!(
                "User {} not found",
                new.receiver_id
            )));
        }

        if let Some(booking_id) = new.booking_id {
            let booking = self
                .bookings
                .get(&booking_id)
                .ok_or_else(|| AppError::not_found(format!("Booking {booking_id} not found")))?;
            if !booking.is_party(new.sender_id) || !booking.is_party(new.receiver_id) {
                return Err(AppError::authorization(
                    "Both participants must be parties to the booking",
                ));
            }
        }

        Ok(())
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create_message(&self, new: NewMessage) -> AppResult<Message> {
        self.authorize(&new)?;

        let message = Message {
            id: MessageId::new(),
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content,
            booking_id: new.booking_id,
            is_read: false,
            created_at: Utc::now(),
        };
        self.messages.insert(message.id, message.clone());

        debug!(message_id = %message.id, sender_id = %message.sender_id, "Message stored");
        Ok(message)
    }

    async fn mark_read(&self, reader: UserId, message_id: MessageId) -> AppResult<Message> {
        let mut entry = self
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| AppError::not_found(format!("Message {message_id} not found")))?;

        if entry.receiver_id != reader {
            return Err(AppError::authorization(
                "Only the receiver can mark a message as read",
            ));
        }
        entry.is_read = true;
        Ok(entry.clone())
    }

    async fn mark_conversation_read(&self, reader: UserId, partner: UserId) -> AppResult<u64> {
        if !self.user_exists(partner) {
            return Err(AppError::not_found(format!("User {partner} not found")));
        }

        let mut flipped = 0u64;
        for mut entry in self.messages.iter_mut() {
            if entry.receiver_id == reader && entry.sender_id == partner && !entry.is_read {
                entry.is_read = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn unread_count(&self, user: UserId) -> AppResult<u64> {
        Ok(self
            .messages
            .iter()
            .filter(|m| m.receiver_id == user && !m.is_read)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use billhub_core::error::ErrorKind;

    use super::*;

    fn new_message(from: UserId, to: UserId) -> NewMessage {
        NewMessage {
            sender_id: from,
            receiver_id: to,
            content: "hello".to_string(),
            booking_id: None,
        }
    }

    fn seeded() -> (MemoryMessageStore, Booking, UserId) {
        let store = MemoryMessageStore::new();
        let booking = Booking {
            id: BookingId::new(),
            advertiser_id: UserId::new(),
            owner_id: UserId::new(),
        };
        let outsider = UserId::new();
        store.add_booking(booking.clone());
        store.add_user(outsider);
        (store, booking, outsider)
    }

    #[tokio::test]
    async fn test_create_and_count_unread() {
        let (store, booking, _) = seeded();
        let a = booking.advertiser_id;
        let b = booking.owner_id;

        let msg = store.create_message(new_message(a, b)).await.unwrap();
        assert!(!msg.is_read);
        assert_eq!(store.unread_count(b).await.unwrap(), 1);
        assert_eq!(store.unread_count(a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_booking_party_rules() {
        let (store, booking, outsider) = seeded();

        let mut ok = new_message(booking.advertiser_id, booking.owner_id);
        ok.booking_id = Some(booking.id);
        assert!(store.create_message(ok).await.is_ok());

        let mut forbidden = new_message(outsider, booking.owner_id);
        forbidden.booking_id = Some(booking.id);
        let err = store.create_message(forbidden).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);

        let mut missing = new_message(booking.advertiser_id, booking.owner_id);
        missing.booking_id = Some(BookingId::new());
        let err = store.create_message(missing).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_unknown_receiver_and_self_message() {
        let (store, booking, _) = seeded();
        let a = booking.advertiser_id;

        let err = store
            .create_message(new_message(a, UserId::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = store.create_message(new_message(a, a)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_mark_read_only_by_receiver() {
        let (store, booking, _) = seeded();
        let a = booking.advertiser_id;
        let b = booking.owner_id;
        let msg = store.create_message(new_message(a, b)).await.unwrap();

        let err = store.mark_read(a, msg.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);

        let read = store.mark_read(b, msg.id).await.unwrap();
        assert!(read.is_read);
        assert_eq!(store.unread_count(b).await.unwrap(), 0);

        let err = store.mark_read(b, MessageId::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_mark_conversation_read_is_scoped_to_partner() {
        let (store, booking, outsider) = seeded();
        let a = booking.advertiser_id;
        let b = booking.owner_id;

        store.create_message(new_message(a, b)).await.unwrap();
        store.create_message(new_message(a, b)).await.unwrap();
        store.create_message(new_message(outsider, b)).await.unwrap();

        assert_eq!(store.mark_conversation_read(b, a).await.unwrap(), 2);
        assert_eq!(store.unread_count(b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_directory_accepts_any_user() {
        let store = MemoryMessageStore::open();
        let msg = store
            .create_message(new_message(UserId::new(), UserId::new()))
            .await
            .unwrap();
        assert_eq!(store.message_count(), 1);
        assert_eq!(store.unread_count(msg.receiver_id).await.unwrap(), 1);
    }
}
