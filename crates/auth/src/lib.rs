//! `tradelink-auth`: pure authorization boundary for the TradeLink client.
//!
//! Everything here is total and side-effect free: no I/O, no clocks read
//! implicitly, no global mutation. The same decisions can back UI gating and
//! server-side enforcement.

pub mod authorize;
pub mod errors;
pub mod identity;
pub mod permissions;
pub mod roles;
pub mod session;

pub use authorize::{
    AccessDenied, AccessExplanation, can_access, can_access_admin_section, can_edit_record,
    can_enter_area, can_view_record, explain_access, has_any_role, has_role, is_admin,
    is_delivery_agent, is_finance, is_salesperson, require_any_role, require_role,
    resolve_landing_path, resolve_landing_path_for, role_display_name,
};
pub use errors::{AuthError, AuthErrorKind, ProviderError, map_provider_error};
pub use identity::Identity;
pub use permissions::Permission;
pub use roles::{LOGIN_PATH, Role, RoleConfig, RoleTable};
pub use session::{Session, SessionValidationError};
