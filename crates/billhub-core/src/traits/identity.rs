//! Credential verification seam used at WebSocket handshake.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::id::UserId;

/// Resolves a bearer credential into the user it was issued to.
///
/// Implementations must return an `Authentication` error for missing,
/// malformed, expired or revoked credentials.
#[async_trait]
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Verify `token` and return the owning user.
    async fn verify(&self, token: &str) -> AppResult<UserId>;
}
