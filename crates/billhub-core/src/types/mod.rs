//! Core type definitions used across the BillHub workspace.

pub mod id;

pub use id::*;
