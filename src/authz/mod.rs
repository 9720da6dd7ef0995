//! Authorization model - roles, permissions and enforcement helpers
//!
//! This module is the single source of truth for the role -> permission
//! mapping. Route handlers (server enforcement) and the gate state machine
//! (client gating) both consult it, so any change to the grant table is a
//! breaking change for every consumer.

mod gate;
mod identity;

pub use gate::{GateDecision, GateMode, PermissionGate, RouteAction, RouteGate, SessionState};
pub use identity::Identity;

use serde::{Deserialize, Serialize};

use crate::audit::{self, EventBus};
use crate::errors::{AppError, AppResult};

/// Coarse identity classification. Exactly one role per authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    User,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::User, Role::Viewer];

    /// Fail-closed boundary: unknown strings do not parse. Callers decide the
    /// fallback policy explicitly (see `Identity`).
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "user" => Some(Role::User),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::User => "user",
            Role::Viewer => "viewer",
        }
    }

    /// Full grant set for this role. Static, process-wide, safe to share.
    pub fn permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Admin => &[
                AgentsCreate,
                AgentsRead,
                AgentsUpdate,
                AgentsDelete,
                AnalyticsRead,
                AnalyticsExport,
                KnowledgeUpload,
                KnowledgeRead,
                KnowledgeDelete,
                UsersManage,
                BillingRead,
                BillingManage,
                SettingsRead,
                SettingsWrite,
                IntegrationsManage,
            ],
            Role::Manager => &[
                AgentsCreate,
                AgentsRead,
                AgentsUpdate,
                AnalyticsRead,
                AnalyticsExport,
                KnowledgeUpload,
                KnowledgeRead,
                KnowledgeDelete,
                BillingRead,
                SettingsRead,
                IntegrationsManage,
            ],
            Role::User => &[
                AgentsCreate,
                AgentsRead,
                AgentsUpdate,
                AnalyticsRead,
                KnowledgeUpload,
                KnowledgeRead,
                SettingsRead,
            ],
            Role::Viewer => &[AgentsRead, AnalyticsRead, KnowledgeRead],
        }
    }

    pub fn has_permission(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn has_any_permission(self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(*p))
    }

    pub fn has_all_permissions(self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(*p))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained capability, named `resource:action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Permission {
    #[serde(rename = "agents:create")]
    AgentsCreate,
    #[serde(rename = "agents:read")]
    AgentsRead,
    #[serde(rename = "agents:update")]
    AgentsUpdate,
    #[serde(rename = "agents:delete")]
    AgentsDelete,
    #[serde(rename = "analytics:read")]
    AnalyticsRead,
    #[serde(rename = "analytics:export")]
    AnalyticsExport,
    #[serde(rename = "knowledge:upload")]
    KnowledgeUpload,
    #[serde(rename = "knowledge:read")]
    KnowledgeRead,
    #[serde(rename = "knowledge:delete")]
    KnowledgeDelete,
    #[serde(rename = "users:manage")]
    UsersManage,
    #[serde(rename = "billing:read")]
    BillingRead,
    #[serde(rename = "billing:manage")]
    BillingManage,
    #[serde(rename = "settings:read")]
    SettingsRead,
    #[serde(rename = "settings:write")]
    SettingsWrite,
    #[serde(rename = "integrations:manage")]
    IntegrationsManage,
}

impl Permission {
    pub const ALL: [Permission; 15] = [
        Permission::AgentsCreate,
        Permission::AgentsRead,
        Permission::AgentsUpdate,
        Permission::AgentsDelete,
        Permission::AnalyticsRead,
        Permission::AnalyticsExport,
        Permission::KnowledgeUpload,
        Permission::KnowledgeRead,
        Permission::KnowledgeDelete,
        Permission::UsersManage,
        Permission::BillingRead,
        Permission::BillingManage,
        Permission::SettingsRead,
        Permission::SettingsWrite,
        Permission::IntegrationsManage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::AgentsCreate => "agents:create",
            Permission::AgentsRead => "agents:read",
            Permission::AgentsUpdate => "agents:update",
            Permission::AgentsDelete => "agents:delete",
            Permission::AnalyticsRead => "analytics:read",
            Permission::AnalyticsExport => "analytics:export",
            Permission::KnowledgeUpload => "knowledge:upload",
            Permission::KnowledgeRead => "knowledge:read",
            Permission::KnowledgeDelete => "knowledge:delete",
            Permission::UsersManage => "users:manage",
            Permission::BillingRead => "billing:read",
            Permission::BillingManage => "billing:manage",
            Permission::SettingsRead => "settings:read",
            Permission::SettingsWrite => "settings:write",
            Permission::IntegrationsManage => "integrations:manage",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side enforcement helper. Denials are terminal for the request:
/// they are audited, logged and surfaced as 403 before any resource access.
pub fn require_permission(
    bus: &EventBus,
    identity: &Identity,
    permission: Permission,
) -> AppResult<()> {
    if identity.role.has_permission(permission) {
        return Ok(());
    }

    tracing::warn!(
        user_id = %identity.id,
        role = %identity.role,
        permission = %permission,
        "permission denied"
    );
    audit::record(
        bus,
        "authz.denied",
        Some(identity.id),
        None,
        serde_json::json!({
            "role": identity.role.as_str(),
            "permission": permission.as_str(),
        }),
    );

    Err(AppError::forbidden())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_is_total_over_roles_and_permissions() {
        for role in Role::ALL {
            for permission in Permission::ALL {
                // must terminate and return a plain bool, never panic
                let _ = role.has_permission(permission);
            }
        }
    }

    #[test]
    fn admin_grants_superset_of_every_role() {
        for role in Role::ALL {
            for permission in role.permissions() {
                assert!(
                    Role::Admin.has_permission(*permission),
                    "admin missing {permission} granted to {role}"
                );
            }
        }
        assert_eq!(Role::Admin.permissions().len(), Permission::ALL.len());
    }

    #[test]
    fn unknown_role_strings_fail_closed() {
        for bogus in ["", "root", "ADMIN", "superuser", "Viewer ", "admin\n"] {
            assert_eq!(Role::parse(bogus), None);
        }
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn manager_grants_match_policy_table() {
        use Permission::*;
        let manager = Role::Manager;
        assert!(manager.has_all_permissions(&[
            AgentsCreate,
            AgentsRead,
            AgentsUpdate,
            AnalyticsRead,
            AnalyticsExport,
            KnowledgeUpload,
            KnowledgeRead,
            KnowledgeDelete,
            BillingRead,
            SettingsRead,
            IntegrationsManage,
        ]));
        assert!(!manager.has_permission(AgentsDelete));
        assert!(!manager.has_permission(UsersManage));
        assert!(!manager.has_permission(BillingManage));
        assert!(!manager.has_permission(SettingsWrite));
    }

    #[test]
    fn user_grants_match_policy_table() {
        use Permission::*;
        let user = Role::User;
        assert!(user.has_all_permissions(&[
            AgentsCreate,
            AgentsRead,
            AgentsUpdate,
            AnalyticsRead,
            KnowledgeUpload,
            KnowledgeRead,
            SettingsRead,
        ]));
        assert!(!user.has_permission(AgentsDelete));
        assert!(!user.has_permission(AnalyticsExport));
        assert!(!user.has_permission(KnowledgeDelete));
        assert!(!user.has_permission(IntegrationsManage));
    }

    #[test]
    fn viewer_is_read_only() {
        use Permission::*;
        assert_eq!(
            Role::Viewer.permissions(),
            &[AgentsRead, AnalyticsRead, KnowledgeRead]
        );
        assert!(!Role::Viewer.has_permission(AgentsCreate));
    }

    #[test]
    fn has_any_and_has_all_are_consistent() {
        for role in Role::ALL {
            for chunk in Permission::ALL.chunks(4) {
                let all = role.has_all_permissions(chunk);
                let any = role.has_any_permission(chunk);
                if all {
                    assert!(any, "{role}: has_all implies has_any");
                }
                assert_eq!(any, chunk.iter().any(|p| role.has_permission(*p)));
            }
        }
        // empty list: vacuous truth for all, false for any
        assert!(Role::Viewer.has_all_permissions(&[]));
        assert!(!Role::Viewer.has_any_permission(&[]));
    }

    #[test]
    fn permission_names_round_trip_through_serde() {
        for permission in Permission::ALL {
            let encoded = serde_json::to_string(&permission).unwrap();
            assert_eq!(encoded, format!("\"{}\"", permission.as_str()));
            let decoded: Permission = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, permission);
        }
    }
}
