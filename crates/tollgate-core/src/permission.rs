//! Roles and permissions
//!
//! Permissions are validated on construction: a `Permission` value that exists
//! is well formed, so nothing downstream re-checks the string. Names are
//! upper snake case (`VIEW_PROJECTS`, `MANAGE_TEAM_MEMBERS`).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use utoipa::ToSchema;

/// Longest accepted permission or role name
pub const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("Permission name is empty")]
    Empty,

    #[error("Permission name exceeds {MAX_NAME_LEN} characters")]
    TooLong,

    #[error("Malformed permission name: {0}")]
    Malformed(String),

    #[error("Malformed role id: {0}")]
    MalformedRole(String),
}

/// A single named capability, e.g. `VIEW_PROJECTS`
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    /// Validate and wrap a permission name
    pub fn parse(raw: &str) -> Result<Self, PermissionError> {
        if raw.is_empty() {
            return Err(PermissionError::Empty);
        }
        if raw.len() > MAX_NAME_LEN {
            return Err(PermissionError::TooLong);
        }

        let mut chars = raw.chars();
        let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_uppercase());
        let rest_valid = chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
        if !starts_with_letter || !rest_valid || raw.ends_with('_') || raw.contains("__") {
            return Err(PermissionError::Malformed(raw.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Permission::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.0
    }
}

impl std::str::FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::parse(s)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role identifier, e.g. `admin` or `project-viewer`
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(try_from = "String", into = "String")]
pub struct RoleId(String);

impl RoleId {
    pub fn parse(raw: &str) -> Result<Self, PermissionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_NAME_LEN || trimmed.contains(char::is_whitespace)
        {
            return Err(PermissionError::MalformedRole(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoleId {
    type Error = PermissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RoleId::parse(&value)
    }
}

impl From<RoleId> for String {
    fn from(value: RoleId) -> Self {
        value.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role → ordered permission list
///
/// Order is kept as the backend returns it; membership checks use the union.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    grants: BTreeMap<RoleId, Vec<Permission>>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the permissions of one role, dropping duplicates but keeping order
    pub fn insert(&mut self, role: RoleId, permissions: impl IntoIterator<Item = Permission>) {
        let entry = self.grants.entry(role).or_default();
        for permission in permissions {
            if !entry.contains(&permission) {
                entry.push(permission);
            }
        }
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleId> {
        self.grants.keys()
    }

    pub fn permissions_for(&self, role: &RoleId) -> &[Permission] {
        self.grants.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Union of every role's permissions
    pub fn union(&self) -> BTreeSet<Permission> {
        self.grants.values().flatten().cloned().collect()
    }

    /// True when any role grants `permission`
    pub fn grants(&self, permission: &Permission) -> bool {
        self.grants.values().any(|perms| perms.contains(permission))
    }
}
