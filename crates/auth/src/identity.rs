use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tradelink_core::UserId;

use crate::Role;

/// Resolved profile of the signed-in user.
///
/// Produced by the profile resolver (or returned alongside a fresh sign-in)
/// and owned by the session bootstrapper. Authorization decisions take
/// `Option<&Identity>`; `None` means "no confirmed identity".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(alias = "is_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(id: UserId, email: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            name: name.into(),
            role,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}
