//! Client-side gating model.
//!
//! A pure state machine mirroring what a frontend does with the session:
//! decide whether to show a protected subtree, show a fallback, or redirect.
//! Gating is advisory only. Every mutating route re-checks on the server, so
//! a client that skips the gate is still rejected with 401/403.

use super::{Identity, Permission};

/// Session as seen by a rendering client. `Loading` is a distinct state so
/// consumers can render a neutral placeholder instead of flashing protected
/// content before resolution completes.
#[derive(Debug, Clone)]
pub enum SessionState {
    Loading,
    Unauthenticated,
    Authenticated(Identity),
}

/// How a multi-permission requirement combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateMode {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Session still resolving: render neither branch.
    Pending,
    /// Render the protected content.
    Show,
    /// Render the fallback (default: nothing).
    Fallback,
}

/// Component-level gate: a required permission set and a decision function.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    required: Vec<Permission>,
    mode: GateMode,
}

impl PermissionGate {
    pub fn new(permission: Permission) -> Self {
        Self {
            required: vec![permission],
            mode: GateMode::All,
        }
    }

    pub fn all_of(permissions: impl Into<Vec<Permission>>) -> Self {
        Self {
            required: permissions.into(),
            mode: GateMode::All,
        }
    }

    pub fn any_of(permissions: impl Into<Vec<Permission>>) -> Self {
        Self {
            required: permissions.into(),
            mode: GateMode::Any,
        }
    }

    pub fn decide(&self, session: &SessionState) -> GateDecision {
        match session {
            SessionState::Loading => GateDecision::Pending,
            SessionState::Unauthenticated => GateDecision::Fallback,
            SessionState::Authenticated(identity) => {
                let granted = match self.mode {
                    GateMode::All => identity.role.has_all_permissions(&self.required),
                    GateMode::Any => identity.role.has_any_permission(&self.required),
                };
                if granted {
                    GateDecision::Show
                } else {
                    GateDecision::Fallback
                }
            }
        }
    }
}

/// Navigation side effect emitted by a route-level gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    RedirectToLogin,
    RedirectToDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolved {
    Loading,
    Unauthenticated,
    Denied,
    Granted,
}

/// Route-level gate: same decision logic, plus a one-shot navigation action
/// per resolved state change. Polling again with an unchanged session yields
/// nothing, so a re-render never re-triggers the redirect.
#[derive(Debug, Clone)]
pub struct RouteGate {
    gate: PermissionGate,
    last: Option<Resolved>,
}

impl RouteGate {
    pub fn new(gate: PermissionGate) -> Self {
        Self { gate, last: None }
    }

    pub fn poll(&mut self, session: &SessionState) -> Option<RouteAction> {
        let resolved = match (session, self.gate.decide(session)) {
            (SessionState::Loading, _) => Resolved::Loading,
            (SessionState::Unauthenticated, _) => Resolved::Unauthenticated,
            (SessionState::Authenticated(_), GateDecision::Show) => Resolved::Granted,
            (SessionState::Authenticated(_), _) => Resolved::Denied,
        };

        let changed = self.last != Some(resolved);
        self.last = Some(resolved);
        if !changed {
            return None;
        }

        match resolved {
            Resolved::Unauthenticated => Some(RouteAction::RedirectToLogin),
            Resolved::Denied => Some(RouteAction::RedirectToDenied),
            Resolved::Loading | Resolved::Granted => None,
        }
    }

    pub fn decision(&self) -> Option<GateDecision> {
        self.last.map(|resolved| match resolved {
            Resolved::Loading => GateDecision::Pending,
            Resolved::Granted => GateDecision::Show,
            Resolved::Unauthenticated | Resolved::Denied => GateDecision::Fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::Role;
    use uuid::Uuid;

    fn identity(role: Role) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: "bea@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn loading_session_never_flashes_a_branch() {
        let gate = PermissionGate::new(Permission::AgentsDelete);
        assert_eq!(gate.decide(&SessionState::Loading), GateDecision::Pending);
    }

    #[test]
    fn resolved_session_commits_to_one_branch() {
        let gate = PermissionGate::new(Permission::AgentsDelete);

        let admin = SessionState::Authenticated(identity(Role::Admin));
        assert_eq!(gate.decide(&admin), GateDecision::Show);

        let viewer = SessionState::Authenticated(identity(Role::Viewer));
        assert_eq!(gate.decide(&viewer), GateDecision::Fallback);

        assert_eq!(
            gate.decide(&SessionState::Unauthenticated),
            GateDecision::Fallback
        );
    }

    #[test]
    fn any_mode_accepts_partial_grants() {
        let gate =
            PermissionGate::any_of([Permission::AgentsDelete, Permission::AgentsRead]);
        let viewer = SessionState::Authenticated(identity(Role::Viewer));
        assert_eq!(gate.decide(&viewer), GateDecision::Show);

        let strict =
            PermissionGate::all_of([Permission::AgentsDelete, Permission::AgentsRead]);
        assert_eq!(strict.decide(&viewer), GateDecision::Fallback);
    }

    #[test]
    fn route_gate_redirects_once_per_state_change() {
        let mut gate = RouteGate::new(PermissionGate::new(Permission::UsersManage));

        // still loading: no action
        assert_eq!(gate.poll(&SessionState::Loading), None);

        // resolves unauthenticated: redirect to login, exactly once
        assert_eq!(
            gate.poll(&SessionState::Unauthenticated),
            Some(RouteAction::RedirectToLogin)
        );
        assert_eq!(gate.poll(&SessionState::Unauthenticated), None);

        // re-resolves as an unauthorized user: redirect to denied, once
        let viewer = SessionState::Authenticated(identity(Role::Viewer));
        assert_eq!(gate.poll(&viewer), Some(RouteAction::RedirectToDenied));
        assert_eq!(gate.poll(&viewer), None);

        // authorized after a role change: content shows, no redirect
        let admin = SessionState::Authenticated(identity(Role::Admin));
        assert_eq!(gate.poll(&admin), None);
        assert_eq!(gate.decision(), Some(GateDecision::Show));
    }
}
