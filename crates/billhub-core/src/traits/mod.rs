//! Collaborator traits defined in `billhub-core` and implemented by other crates.

pub mod identity;

pub use identity::IdentityVerifier;
