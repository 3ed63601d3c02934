//! # billhub-auth
//!
//! Verifies the bearer tokens the marketplace API issues, turning them into
//! a [`billhub_core::types::UserId`] for the real-time gateway.

pub mod jwt;

pub use jwt::{Claims, JwtEncoder, JwtVerifier, TokenType};
