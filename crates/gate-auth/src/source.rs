//! The identity provider seam.

use crate::{AuthResult, Session};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Where to send the browser to start a federated sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedRedirect {
    pub url: String,
}

/// Identity provider operations consumed by the gate.
///
/// Operations that establish or end a session report the outcome through
/// the change feed, not through their return value: `verify_code` returns
/// `Ok(())` and the new session arrives as a change event.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Current session, if any.
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// Subscribe to session changes (sign-in, sign-out, refresh, return
    /// from a federated redirect).
    fn on_change(&self) -> broadcast::Receiver<Option<Session>>;

    /// Send a one-time code to a phone number (E.164).
    async fn sign_in_with_phone(&self, phone: &str) -> AuthResult<()>;

    /// Verify a one-time code previously sent to `phone`.
    async fn verify_code(&self, phone: &str, code: &str) -> AuthResult<()>;

    /// Prepare a federated sign-in that returns to `return_path`.
    async fn sign_in_with_federated_provider(
        &self,
        return_path: &str,
    ) -> AuthResult<FederatedRedirect>;

    /// End the current session.
    async fn sign_out(&self) -> AuthResult<()>;
}
