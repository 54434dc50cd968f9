use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use tradelink_core::{DomainError, DomainResult};

use crate::Permission;

/// Route of the unauthenticated entry point.
pub const LOGIN_PATH: &str = "/login";

/// Role identifier used for RBAC.
///
/// The set of roles is closed: every role the backend can assign is listed
/// here, and the [`RoleTable`] must describe each of them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[serde(alias = "salesperson")]
    Sales,
    Delivery,
    Finance,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Sales, Role::Delivery, Role::Finance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Sales => "sales",
            Role::Delivery => "delivery",
            Role::Finance => "finance",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "sales" | "salesperson" => Ok(Role::Sales),
            "delivery" => Ok(Role::Delivery),
            "finance" => Ok(Role::Finance),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Static description of one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub display_name: String,
    pub permissions: BTreeSet<Permission>,
    /// Role areas (route sections) this role may enter.
    pub accessible_roles: BTreeSet<Role>,
    /// Default route after sign-in.
    pub landing_path: String,
}

/// Immutable role → capability mapping, loaded once at process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleTable {
    roles: BTreeMap<Role, RoleConfig>,
}

static BUILTIN: LazyLock<RoleTable> = LazyLock::new(RoleTable::compiled);

impl RoleTable {
    /// The table compiled into the binary.
    pub fn builtin() -> &'static RoleTable {
        &BUILTIN
    }

    /// Load a table from its JSON artifact.
    ///
    /// Every [`Role`] must be described; a table with a missing role is
    /// rejected rather than silently denying that role everything.
    pub fn from_json(raw: &str) -> DomainResult<Self> {
        let table: RoleTable = serde_json::from_str(raw)?;
        for role in Role::ALL {
            if !table.roles.contains_key(&role) {
                return Err(DomainError::config(format!("role table is missing '{role}'")));
            }
        }
        tracing::debug!(roles = table.roles.len(), "loaded role table");
        Ok(table)
    }

    pub fn get(&self, role: Role) -> Option<&RoleConfig> {
        self.roles.get(&role)
    }

    /// Whether `role` is granted `capability`.
    pub fn grants(&self, role: Role, capability: &str) -> bool {
        self.get(role)
            .is_some_and(|config| config.permissions.contains(capability))
    }

    pub fn landing_path(&self, role: Role) -> &str {
        self.get(role)
            .map(|config| config.landing_path.as_str())
            .unwrap_or(LOGIN_PATH)
    }

    pub fn display_name(&self, role: Role) -> &str {
        self.get(role)
            .map(|config| config.display_name.as_str())
            .unwrap_or_else(|| role.as_str())
    }

    pub fn can_enter(&self, role: Role, area: Role) -> bool {
        self.get(role)
            .is_some_and(|config| config.accessible_roles.contains(&area))
    }

    fn compiled() -> Self {
        fn config(
            display_name: &str,
            permissions: &[&'static str],
            accessible_roles: &[Role],
            landing_path: &str,
        ) -> RoleConfig {
            RoleConfig {
                display_name: display_name.to_string(),
                permissions: permissions.iter().map(|&p| Permission::from_static(p)).collect(),
                accessible_roles: accessible_roles.iter().copied().collect(),
                landing_path: landing_path.to_string(),
            }
        }

        let mut roles = BTreeMap::new();
        roles.insert(
            Role::Admin,
            config(
                "Administrator",
                &[
                    "users.manage",
                    "products.manage",
                    "companies.manage",
                    "orders.manage",
                    "orders.approve",
                    "orders.cancel",
                    "trips.manage",
                    "reports.view",
                    "settings.manage",
                    "system.health",
                    "migration.run",
                ],
                &Role::ALL,
                "/admin/dashboard",
            ),
        );
        roles.insert(
            Role::Sales,
            config(
                "Salesperson",
                &[
                    "orders.create",
                    "orders.edit_own",
                    "orders.view_own",
                    "reports.view_own",
                    "customers.view",
                ],
                &[Role::Sales],
                "/sales/dashboard",
            ),
        );
        roles.insert(
            Role::Delivery,
            config(
                "Delivery Agent",
                &[
                    "orders.view_assigned",
                    "orders.update_status",
                    "trips.view_assigned",
                    "challan.print",
                    "gps.track",
                ],
                &[Role::Delivery],
                "/delivery/dashboard",
            ),
        );
        roles.insert(
            Role::Finance,
            config(
                "Finance",
                &["orders.view", "reports.view", "invoices.view", "payments.view"],
                &[Role::Finance],
                "/finance/dashboard",
            ),
        );
        Self { roles }
    }
}
