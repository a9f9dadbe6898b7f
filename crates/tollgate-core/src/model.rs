//! Session, identity, and MFA domain models

use crate::error::{AuthError, ErrorCode};
use crate::permission::{Permission, RoleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use utoipa::ToSchema;

/// Public profile of a signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub roles: Vec<RoleId>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// Identity resolved from a bearer credential by the identity backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub app_metadata: serde_json::Value,
}

/// Second-factor delivery method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MfaMethod {
    Totp,
    Sms,
    Email,
}

impl MfaMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MfaMethod::Totp => "totp",
            MfaMethod::Sms => "sms",
            MfaMethod::Email => "email",
        }
    }
}

impl std::fmt::Display for MfaMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending second-factor step between a password check and a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaChallenge {
    pub temp_token: String,
    pub method: MfaMethod,
    pub expires_at: DateTime<Utc>,
}

impl MfaChallenge {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// An authenticated client session
///
/// `expires_at > issued_at` always holds; construct through [`Session::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    user_id: String,
    email: String,
    roles: BTreeSet<RoleId>,
    permissions: BTreeSet<Permission>,
    access_token: String,
    refresh_token: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user: &UserProfile,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        if expires_at <= issued_at {
            return Err(AuthError::InvalidToken(format!(
                "token expiry {expires_at} is not after issue time {issued_at}"
            )));
        }

        Ok(Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            roles: user.roles.iter().cloned().collect(),
            permissions: user.permissions.iter().cloned().collect(),
            access_token: access_token.into(),
            refresh_token,
            issued_at,
            expires_at,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// A session whose expiry has passed is never valid
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    /// Swap in a refreshed token, keeping identity and grants
    pub fn with_token(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        if expires_at <= issued_at {
            return Err(AuthError::InvalidToken(format!(
                "token expiry {expires_at} is not after issue time {issued_at}"
            )));
        }
        Ok(Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            issued_at,
            expires_at,
            ..self.clone()
        })
    }
}

/// Failure half of [`AuthResult`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub code: ErrorCode,
    pub message: String,
    pub retry_after: Option<Duration>,
    pub remaining_attempts: Option<u32>,
}

impl AuthFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
            remaining_attempts: None,
        }
    }

    /// Retry delay in milliseconds, the unit UIs count down in
    pub fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after.map(|d| d.as_millis() as u64)
    }
}

impl From<AuthError> for AuthFailure {
    fn from(err: AuthError) -> Self {
        Self {
            code: err.code(),
            message: err.public_message(),
            retry_after: err.retry_after(),
            remaining_attempts: err.remaining_attempts(),
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of login, MFA verification, and refresh
///
/// Expected failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Success {
        user: UserProfile,
        token: String,
        requires_mfa: bool,
    },
    Failure(AuthFailure),
}

impl AuthResult {
    pub fn failure(err: AuthError) -> Self {
        AuthResult::Failure(err.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthResult::Success { .. })
    }

    pub fn requires_mfa(&self) -> bool {
        matches!(
            self,
            AuthResult::Success {
                requires_mfa: true,
                ..
            }
        )
    }

    pub fn failure_code(&self) -> Option<ErrorCode> {
        match self {
            AuthResult::Failure(failure) => Some(failure.code),
            AuthResult::Success { .. } => None,
        }
    }
}
