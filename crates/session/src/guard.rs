//! Route guard: maps the published state onto a render/redirect decision.

use tradelink_auth::{AuthError, LOGIN_PATH, Role, has_any_role, resolve_landing_path};

use crate::state::{BootStatus, SessionSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Boot not finished; show a neutral loading indicator.
    Verifying,
    /// Boot ended with an error and no identity; offer retry or sign-in.
    BootFailed(AuthError),
    /// No identity; send the user to the sign-in entry point.
    Unauthenticated,
    /// Signed in but not allowed here.
    Forbidden { redirect: &'static str },
    Authorized,
}

impl GuardDecision {
    /// Where the shell should navigate, if anywhere.
    pub fn redirect(&self) -> Option<&'static str> {
        match self {
            GuardDecision::Unauthenticated => Some(LOGIN_PATH),
            GuardDecision::Forbidden { redirect } => Some(*redirect),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GuardDecision::Verifying)
    }
}

/// Guard for a protected subtree.
///
/// An empty role list admits any active, signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteGuard {
    required_roles: Vec<Role>,
}

impl RouteGuard {
    pub fn new(required_roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            required_roles: required_roles.into_iter().collect(),
        }
    }

    pub fn any_role() -> Self {
        Self::default()
    }

    pub fn required_roles(&self) -> &[Role] {
        &self.required_roles
    }

    pub fn evaluate(&self, snapshot: &SessionSnapshot) -> GuardDecision {
        if snapshot.status != BootStatus::Ready {
            return GuardDecision::Verifying;
        }

        let Some(identity) = snapshot.identity.as_ref() else {
            return match &snapshot.boot_error {
                Some(error) => GuardDecision::BootFailed(error.clone()),
                None => GuardDecision::Unauthenticated,
            };
        };

        if !identity.active {
            return GuardDecision::Forbidden {
                redirect: LOGIN_PATH,
            };
        }

        if !self.required_roles.is_empty() && !has_any_role(Some(identity), &self.required_roles) {
            tracing::debug!(
                role = %identity.role,
                required = ?self.required_roles,
                "route guard denied access"
            );
            return GuardDecision::Forbidden {
                redirect: resolve_landing_path(Some(identity.role)),
            };
        }

        GuardDecision::Authorized
    }
}
