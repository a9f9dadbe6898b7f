//! Role and permission resolution
//!
//! A user's effective permissions are the union of the permissions granted by
//! each of their roles. Role data comes from a [`RoleRepository`]; resolved
//! sets are cached per session so a protected request costs one lookup per
//! session rather than one per request.

use async_trait::async_trait;
use futures::future::try_join_all;
use moka::future::Cache;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tollgate_core::{AuthError, Permission, PermissionSet, RoleId};
use tracing::{debug, warn};

/// Upper bound on cached sessions
const CACHE_CAPACITY: u64 = 10_000;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Role store unavailable: {0}")]
    Unavailable(String),
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn get_roles(&self, user_id: &str) -> Result<Vec<RoleId>, RepositoryError>;

    async fn get_permissions_for_role(
        &self,
        role: &RoleId,
    ) -> Result<Vec<Permission>, RepositoryError>;
}

/// In-process role table, assembled with a builder
#[derive(Debug, Clone, Default)]
pub struct MemoryRoleRepository {
    roles: HashMap<RoleId, Vec<Permission>>,
    assignments: HashMap<String, Vec<RoleId>>,
}

impl MemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(
        mut self,
        role: RoleId,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        self.roles.entry(role).or_default().extend(permissions);
        self
    }

    pub fn assign(mut self, user_id: impl Into<String>, role: RoleId) -> Self {
        let roles = self.assignments.entry(user_id.into()).or_default();
        if !roles.contains(&role) {
            roles.push(role);
        }
        self
    }
}

#[async_trait]
impl RoleRepository for MemoryRoleRepository {
    async fn get_roles(&self, user_id: &str) -> Result<Vec<RoleId>, RepositoryError> {
        Ok(self.assignments.get(user_id).cloned().unwrap_or_default())
    }

    async fn get_permissions_for_role(
        &self,
        role: &RoleId,
    ) -> Result<Vec<Permission>, RepositoryError> {
        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }
}

/// Postgres role store
///
/// Expects `user_roles(user_id TEXT, role_id TEXT)` and
/// `role_permissions(role_id TEXT, permission TEXT, position INT)`.
#[derive(Clone)]
pub struct PgRoleRepository {
    pool: PgPool,
}

impl PgRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for PgRoleRepository {
    async fn get_roles(&self, user_id: &str) -> Result<Vec<RoleId>, RepositoryError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT role_id FROM user_roles WHERE user_id = $1 ORDER BY role_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|raw| match RoleId::parse(&raw) {
                Ok(role) => Some(role),
                Err(e) => {
                    warn!(user_id = %user_id, role = %raw, error = %e, "Skipping malformed role");
                    None
                }
            })
            .collect())
    }

    async fn get_permissions_for_role(
        &self,
        role: &RoleId,
    ) -> Result<Vec<Permission>, RepositoryError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT permission FROM role_permissions WHERE role_id = $1 ORDER BY position",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|raw| match Permission::parse(&raw) {
                Ok(permission) => Some(permission),
                Err(e) => {
                    warn!(role = %role, permission = %raw, error = %e, "Skipping malformed permission");
                    None
                }
            })
            .collect())
    }
}

/// Resolves and caches effective permissions
#[derive(Clone)]
pub struct PermissionResolver {
    repository: Arc<dyn RoleRepository>,
    cache: Cache<String, Arc<PermissionSet>>,
}

impl PermissionResolver {
    /// `ttl` bounds how long a session's permissions may be served from cache
    pub fn new(repository: Arc<dyn RoleRepository>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(ttl)
            .build();
        Self { repository, cache }
    }

    pub async fn get_roles(&self, user_id: &str) -> Result<Vec<RoleId>, AuthError> {
        Ok(self.repository.get_roles(user_id).await?)
    }

    pub async fn get_permissions_for_role(
        &self,
        role: &RoleId,
    ) -> Result<Vec<Permission>, AuthError> {
        Ok(self.repository.get_permissions_for_role(role).await?)
    }

    /// Fetch every role of the user and its permissions, uncached
    pub async fn resolve(&self, user_id: &str) -> Result<PermissionSet, AuthError> {
        let roles = self.get_roles(user_id).await?;
        let grants = try_join_all(roles.into_iter().map(|role| async move {
            let permissions = self.get_permissions_for_role(&role).await?;
            Ok::<_, AuthError>((role, permissions))
        }))
        .await?;

        let mut set = PermissionSet::new();
        for (role, permissions) in grants {
            set.insert(role, permissions);
        }
        Ok(set)
    }

    /// Resolve through the per-session cache
    pub async fn resolve_cached(
        &self,
        session_key: &str,
        user_id: &str,
    ) -> Result<Arc<PermissionSet>, AuthError> {
        if let Some(set) = self.cache.get(session_key).await {
            return Ok(set);
        }

        let set = Arc::new(self.resolve(user_id).await?);
        self.cache.insert(session_key.to_string(), set.clone()).await;
        debug!(user_id = %user_id, roles = set.roles().count(), "Cached permission set");
        Ok(set)
    }

    /// Whether any of the user's roles grants `permission`
    ///
    /// A malformed permission name is a `BadRequest` and never reaches the
    /// repository.
    pub async fn has_permission(&self, user_id: &str, permission: &str) -> Result<bool, AuthError> {
        let permission =
            Permission::parse(permission).map_err(|e| AuthError::BadRequest(e.to_string()))?;
        Ok(self.resolve(user_id).await?.grants(&permission))
    }

    pub async fn invalidate(&self, session_key: &str) {
        self.cache.invalidate(session_key).await;
    }
}
