//! JWT claims, encoding and verification.

pub mod claims;
pub mod encoder;
pub mod verifier;

pub use claims::{Claims, TokenType};
pub use encoder::JwtEncoder;
pub use verifier::JwtVerifier;
