//! Authentication is an external collaborator per the chat relay's own
//! design: a plug-point that turns credentials into an opaque user id.
//! This module defines the trait seam and a reference implementation
//! suitable for tests and trusted-network deployments; production
//! deployments supply their own `Authenticator`.

use async_trait::async_trait;
use relay_proto::Document;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify credentials embedded in an `authenticate` request and
    /// return the opaque user id on success.
    async fn authenticate(&self, credentials: &Document) -> Result<String, AuthError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing user_id credential")]
    MissingUserId,
    #[error("credential rejected")]
    Rejected,
}

/// Trusts a `user_id` field verbatim. Not suitable for an untrusted
/// network; real deployments replace this with a token or SCRAM verifier.
pub struct TrustedUserIdAuthenticator;

#[async_trait]
impl Authenticator for TrustedUserIdAuthenticator {
    async fn authenticate(&self, credentials: &Document) -> Result<String, AuthError> {
        let user_id = credentials
            .get_str("user_id")
            .map_err(|_| AuthError::MissingUserId)?;
        if user_id.is_empty() {
            return Err(AuthError::Rejected);
        }
        Ok(user_id.to_string())
    }
}
