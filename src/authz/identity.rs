use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use super::Role;
use crate::app::AppState;
use crate::errors::AppError;
use crate::jwt::Claims;

/// The resolved caller. Handlers receive this as an extractor argument and
/// pass it down explicitly; nothing below the route layer re-resolves the
/// session.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Identity {
    /// Roleless or unrecognized role claims fall back to `viewer`, the
    /// least-privileged role. This is a documented convenience for stale
    /// tokens, not a security boundary: unknown strings never gain grants.
    pub fn from_claims(claims: Claims) -> Self {
        let role = claims
            .role
            .as_deref()
            .and_then(Role::parse)
            .unwrap_or(Role::Viewer);

        Identity {
            id: claims.sub,
            email: claims.email,
            role,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    /// Resolves the session from the bearer token alone. No database access
    /// happens here, so an unauthenticated request is rejected before any
    /// data-layer call in the handler.
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(AppError::unauthorized)?;

        let claims = state.jwt.decode(token)?;

        Ok(Identity::from_claims(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Option<&str>) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            role: role.map(String::from),
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn known_role_is_preserved() {
        let identity = Identity::from_claims(claims(Some("manager")));
        assert_eq!(identity.role, Role::Manager);
    }

    #[test]
    fn missing_role_defaults_to_viewer() {
        let identity = Identity::from_claims(claims(None));
        assert_eq!(identity.role, Role::Viewer);
    }

    #[test]
    fn unknown_role_defaults_to_viewer() {
        let identity = Identity::from_claims(claims(Some("superuser")));
        assert_eq!(identity.role, Role::Viewer);
    }
}
