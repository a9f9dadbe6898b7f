//! Caller context injected by the route guard

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tollgate_core::{AuthError, Permission, RoleId, UserProfile};

use crate::error::AppError;

/// Who is calling, as established by the route guard
///
/// Handlers behind an authenticated guard take it as an extractor. On a route
/// without one, extraction fails with `MISSING_TOKEN`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub roles: Vec<RoleId>,
    pub permissions: Vec<Permission>,
    /// Key of the cached permission set for this session
    pub session_key: String,
}

impl AuthContext {
    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    /// Profile view of the caller; a session only exists for verified users
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.user_id.clone(),
            email: self.email.clone(),
            name: None,
            email_verified: true,
            roles: self.roles.clone(),
            permissions: self.permissions.clone(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::from(AuthError::MissingToken))
    }
}
