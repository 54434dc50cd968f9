//! Collaborator interfaces: identity provider and profile resolver.

use async_trait::async_trait;
use tradelink_auth::{Identity, ProviderError, Session};
use tradelink_core::UserId;

/// Result of a successful password sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub session: Session,
    pub identity: Identity,
}

/// Auth-state change pushed by the identity provider (e.g. another tab
/// signed out, or tokens were refreshed in the background).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current remote session, if any.
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignIn, ProviderError>;

    /// Best-effort; local logout never waits on its outcome.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Exchange the refresh token; `None` when there is nothing to refresh.
    async fn refresh_session(&self) -> Result<Option<Session>, ProviderError>;
}

/// Resolves the application profile for a session subject.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn load_profile(&self, subject: &UserId) -> Result<Identity, ProviderError>;
}
