//! Booking entities, reduced to what message authorization needs.

pub mod model;

pub use model::Booking;
