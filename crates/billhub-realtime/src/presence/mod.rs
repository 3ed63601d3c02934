//! User presence tracking.

pub mod status;
pub mod tracker;

pub use status::{PresenceEntry, PresenceState};
pub use tracker::PresenceTracker;
