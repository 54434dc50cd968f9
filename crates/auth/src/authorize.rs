//! Authorization gate: role, capability and record-ownership decisions.
//!
//! - No IO
//! - No panics
//! - `None` identity is always denied

use serde::Serialize;
use thiserror::Error;
use tradelink_core::UserId;

use crate::{Identity, LOGIN_PATH, Role, RoleTable};

/// Admin sections reachable from the admin navigation.
const ADMIN_SECTIONS: &[&str] = &[
    "dashboard",
    "users",
    "products",
    "companies",
    "orders",
    "dispatch",
    "trips",
    "vehicles",
    "purchases",
    "reports",
    "returns",
    "damages",
    "health",
    "migration",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("authentication required{}", context_suffix(.0))]
    Unauthenticated(Option<String>),

    #[error("permission denied: {required} access required{}", context_suffix(.context))]
    Forbidden {
        required: String,
        context: Option<String>,
    },
}

fn context_suffix(context: &Option<String>) -> String {
    context
        .as_deref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}

pub fn has_role(identity: Option<&Identity>, role: Role) -> bool {
    identity.is_some_and(|i| i.role == role)
}

pub fn has_any_role(identity: Option<&Identity>, roles: &[Role]) -> bool {
    identity.is_some_and(|i| roles.contains(&i.role))
}

pub fn is_admin(identity: Option<&Identity>) -> bool {
    has_role(identity, Role::Admin)
}

pub fn is_salesperson(identity: Option<&Identity>) -> bool {
    has_role(identity, Role::Sales)
}

pub fn is_delivery_agent(identity: Option<&Identity>) -> bool {
    has_role(identity, Role::Delivery)
}

pub fn is_finance(identity: Option<&Identity>) -> bool {
    has_role(identity, Role::Finance)
}

/// Capability check against the built-in role table.
pub fn can_access(identity: Option<&Identity>, capability: &str) -> bool {
    identity.is_some_and(|i| RoleTable::builtin().grants(i.role, capability))
}

/// Whether the identity may enter the route area owned by `area`.
pub fn can_enter_area(identity: Option<&Identity>, area: Role) -> bool {
    identity.is_some_and(|i| RoleTable::builtin().can_enter(i.role, area))
}

pub fn can_access_admin_section(identity: Option<&Identity>, section: &str) -> bool {
    is_admin(identity) && ADMIN_SECTIONS.contains(&section)
}

/// Default route for a role; `None` maps to the sign-in page.
pub fn resolve_landing_path(role: Option<Role>) -> &'static str {
    match role {
        Some(role) => RoleTable::builtin().landing_path(role),
        None => LOGIN_PATH,
    }
}

/// Default route for a role given by name; unknown names map to the sign-in page.
pub fn resolve_landing_path_for(role: &str) -> &'static str {
    resolve_landing_path(role.parse().ok())
}

pub fn role_display_name(role: Option<Role>) -> &'static str {
    match role {
        Some(role) => RoleTable::builtin().display_name(role),
        None => "Unknown",
    }
}

/// Admins edit anything; salespeople edit the records they created.
pub fn can_edit_record(identity: Option<&Identity>, owner_email: &str) -> bool {
    let Some(identity) = identity else {
        return false;
    };
    match identity.role {
        Role::Admin => true,
        Role::Sales => identity.email == owner_email,
        Role::Delivery | Role::Finance => false,
    }
}

/// Admins view anything; salespeople view their own records; delivery
/// agents view the records assigned to them.
pub fn can_view_record(
    identity: Option<&Identity>,
    owner_email: &str,
    assignee: Option<&UserId>,
) -> bool {
    let Some(identity) = identity else {
        return false;
    };
    match identity.role {
        Role::Admin => true,
        Role::Sales => identity.email == owner_email,
        Role::Delivery => assignee == Some(&identity.id),
        Role::Finance => false,
    }
}

pub fn require_role<'a>(
    identity: Option<&'a Identity>,
    required: Role,
    context: Option<&str>,
) -> Result<&'a Identity, AccessDenied> {
    require_any_role(identity, &[required], context)
}

pub fn require_any_role<'a>(
    identity: Option<&'a Identity>,
    required: &[Role],
    context: Option<&str>,
) -> Result<&'a Identity, AccessDenied> {
    let context = context.map(str::to_string);
    let Some(identity) = identity else {
        return Err(AccessDenied::Unauthenticated(context));
    };
    if required.contains(&identity.role) {
        return Ok(identity);
    }
    let required = match required {
        [single] => single.to_string(),
        many => format!(
            "one of [{}]",
            many.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
        ),
    };
    Err(AccessDenied::Forbidden { required, context })
}

// ─────────────────────────────────────────────────────────────────────────────
// Access Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of a capability decision.
#[derive(Debug, Clone, Serialize)]
pub struct AccessExplanation {
    pub capability: String,
    pub granted: bool,
    pub reason: String,
    pub role: Option<Role>,
    pub effective_permissions: Vec<String>,
    /// Roles whose grants include the capability (empty when granted).
    pub granting_roles: Vec<Role>,
}

/// Explain why [`can_access`] would allow or deny `capability`.
pub fn explain_access(
    identity: Option<&Identity>,
    capability: &str,
    table: &RoleTable,
) -> AccessExplanation {
    let Some(identity) = identity else {
        return AccessExplanation {
            capability: capability.to_string(),
            granted: false,
            reason: "no authenticated identity".to_string(),
            role: None,
            effective_permissions: Vec::new(),
            granting_roles: Vec::new(),
        };
    };

    let effective_permissions: Vec<String> = table
        .get(identity.role)
        .map(|config| config.permissions.iter().map(|p| p.to_string()).collect())
        .unwrap_or_default();

    if table.grants(identity.role, capability) {
        return AccessExplanation {
            capability: capability.to_string(),
            granted: true,
            reason: format!("role '{}' grants '{}'", identity.role, capability),
            role: Some(identity.role),
            effective_permissions,
            granting_roles: Vec::new(),
        };
    }

    let granting_roles: Vec<Role> = Role::ALL
        .into_iter()
        .filter(|role| table.grants(*role, capability))
        .collect();

    AccessExplanation {
        capability: capability.to_string(),
        granted: false,
        reason: format!(
            "role '{}' does not grant '{}'",
            identity.role, capability
        ),
        role: Some(identity.role),
        effective_permissions,
        granting_roles,
    }
}
