use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradelink_core::UserId;

/// Sessions are considered stale this long before their hard expiry.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Opaque remote-session handle returned by the identity provider.
///
/// Held in process memory only; never written to the identity cache.
/// Token material is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Subject of the session (the profile key).
    pub subject: UserId,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionValidationError {
    #[error("session has expired")]
    Expired,

    #[error("session not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid session time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

impl Session {
    pub fn new(subject: UserId, access_token: impl Into<String>) -> Self {
        Self {
            subject,
            access_token: access_token.into(),
            refresh_token: None,
            issued_at: None,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Deterministically validate the session's time window at `now`.
    ///
    /// A session without an expiry never expires. Expiry is brought forward
    /// by [`EXPIRY_BUFFER_SECS`] so that a token is not used in its last
    /// minute.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), SessionValidationError> {
        if let (Some(issued), Some(expires)) = (self.issued_at, self.expires_at) {
            if expires <= issued {
                return Err(SessionValidationError::InvalidTimeWindow);
            }
        }
        if let Some(issued) = self.issued_at {
            if now < issued {
                return Err(SessionValidationError::NotYetValid);
            }
        }
        if let Some(expires) = self.expires_at {
            if now >= expires - Duration::seconds(EXPIRY_BUFFER_SECS) {
                return Err(SessionValidationError::Expired);
            }
        }
        Ok(())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.validate(now).is_ok()
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("subject", &self.subject)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
