//! # billhub-core
//!
//! Core crate for the BillHub marketplace messaging service. Contains
//! configuration schemas, typed identifiers, the collaborator traits the
//! real-time layer consumes, and the unified error system.
//!
//! This crate has **no** internal dependencies on other BillHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
