//! Authentication error taxonomy and raw provider error mapping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure kinds surfaced to callers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorKind {
    InvalidCredentials,
    NetworkError,
    ServerError,
    ProfileNotFound,
    Forbidden,
    SessionExpired,
    BootTimeout,
    UnknownError,
}

impl AuthErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            AuthErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthErrorKind::NetworkError => "NETWORK_ERROR",
            AuthErrorKind::ServerError => "SERVER_ERROR",
            AuthErrorKind::ProfileNotFound => "PROFILE_NOT_FOUND",
            AuthErrorKind::Forbidden => "FORBIDDEN",
            AuthErrorKind::SessionExpired => "SESSION_EXPIRED",
            AuthErrorKind::BootTimeout => "BOOT_TIMEOUT",
            AuthErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Retryable kinds get a retry action; the rest send the user back to sign-in.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            AuthErrorKind::NetworkError
                | AuthErrorKind::ServerError
                | AuthErrorKind::BootTimeout
                | AuthErrorKind::UnknownError
        )
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            AuthErrorKind::InvalidCredentials => "Invalid email or password. Please try again.",
            AuthErrorKind::NetworkError => {
                "Network error. Please check your connection and try again."
            }
            AuthErrorKind::ServerError => "Server error. Please try again in a moment.",
            AuthErrorKind::ProfileNotFound => "Account profile not found. Please contact support.",
            AuthErrorKind::Forbidden => {
                "Access to this account profile was denied. Please contact support."
            }
            AuthErrorKind::SessionExpired => "Your session has expired. Please sign in again.",
            AuthErrorKind::BootTimeout => "boot timed out",
            AuthErrorKind::UnknownError => "An unexpected error occurred. Please try again.",
        }
    }
}

impl core::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// The only error shape shown to callers of the session layer.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct AuthError {
    kind: AuthErrorKind,
    message: String,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
        }
    }

    pub fn with_message(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn boot_timeout() -> Self {
        Self::new(AuthErrorKind::BootTimeout)
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

impl From<AuthErrorKind> for AuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Raw failure reported by the identity provider or profile resolver.
///
/// Never shown to a caller directly; always passed through
/// [`map_provider_error`] first.
#[derive(Debug, Error, Clone, Default, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    /// Provider- or database-specific code (e.g. `"PGRST116"`, `"ECONNREFUSED"`).
    pub code: Option<String>,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Error class name reported by the transport (e.g. `"NetworkError"`).
    pub name: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(message).with_name("NetworkError")
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(message).with_status(status)
    }

    pub fn invalid_credentials() -> Self {
        Self::new("Invalid login credentials").with_status(400)
    }

    pub fn profile_not_found() -> Self {
        Self::new("JSON object requested, multiple (or no) rows returned").with_code("PGRST116")
    }

    pub fn forbidden() -> Self {
        Self::new("permission denied for table users")
            .with_code("42501")
            .with_status(403)
    }

    pub fn session_expired() -> Self {
        Self::new("JWT expired").with_status(401)
    }
}

/// Map a raw provider failure to exactly one [`AuthErrorKind`].
///
/// Checks run in a fixed order; the first match wins. Unknown failures keep
/// the provider's message when it has one.
pub fn map_provider_error(error: &ProviderError) -> AuthError {
    let message = error.message.as_str();
    let code = error.code.as_deref().unwrap_or_default();

    if message.contains("Invalid login credentials") {
        return AuthErrorKind::InvalidCredentials.into();
    }

    if message.contains("network")
        || message.contains("fetch")
        || code == "ECONNREFUSED"
        || error.name.as_deref() == Some("NetworkError")
    {
        return AuthErrorKind::NetworkError.into();
    }

    if code == "PGRST116" {
        return AuthErrorKind::ProfileNotFound.into();
    }

    if code == "42501" || error.status == Some(403) {
        return AuthErrorKind::Forbidden.into();
    }

    if message.contains("expired") || message.contains("JWT") {
        return AuthErrorKind::SessionExpired.into();
    }

    if error.status.is_some_and(|s| s >= 500) || code.starts_with('5') {
        return AuthErrorKind::ServerError.into();
    }

    if message.is_empty() {
        AuthErrorKind::UnknownError.into()
    } else {
        AuthError::with_message(AuthErrorKind::UnknownError, message)
    }
}
