//! Booking participants model.

use serde::{Deserialize, Serialize};

use billhub_core::types::id::{BookingId, UserId};

/// A billboard booking between an advertiser and the listing owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking identifier.
    pub id: BookingId,
    /// User who booked the billboard.
    pub advertiser_id: UserId,
    /// Owner of the booked listing.
    pub owner_id: UserId,
}

impl Booking {
    /// Whether `user` is one of the two parties.
    pub fn is_party(&self, user: UserId) -> bool {
        self.advertiser_id == user || self.owner_id == user
    }
}
