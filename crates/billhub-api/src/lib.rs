//! # billhub-api
//!
//! HTTP surface for BillHub messaging built on Axum.
//!
//! Provides the `/ws` gateway (authenticate, upgrade, pump frames between
//! the socket and the real-time engine), health endpoints, CORS, and the
//! mapping from `AppError` to HTTP responses.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use router::build_app;
pub use state::AppState;
