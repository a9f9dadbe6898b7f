//! Identity backends
//!
//! An [`IdentityProvider`] owns credentials: it checks passwords, runs the
//! second-factor step, issues and revokes tokens, and resolves a bearer token
//! to an [`Identity`]. Roles and permissions are not its concern; those come
//! from the [`crate::auth::PermissionResolver`].

pub mod delivery;
pub mod local;
pub mod remote;

pub use delivery::{CodeDelivery, Delivery, DeliveryKind, LogDelivery, RecordingDelivery};
pub use local::{LocalIdentityProvider, TotpEnrollment};
pub use remote::RemoteIdentityProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tollgate_core::{AuthError, Identity, MfaMethod, UserProfile};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials { remaining_attempts: Option<u32> },

    #[error("Account is temporarily locked")]
    Locked { retry_after: Duration },

    #[error("Email address has not been verified")]
    EmailNotVerified,

    #[error("Credential rejected: {0}")]
    Rejected(String),

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Verification challenge has expired")]
    ChallengeExpired,

    #[error("Email is already registered")]
    Conflict,

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Identity backend unavailable: {0}")]
    Unavailable(String),
}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials { remaining_attempts } => {
                AuthError::InvalidCredentials { remaining_attempts }
            }
            IdentityError::Locked { retry_after } => AuthError::RateLimited {
                retry_after: Some(retry_after),
                remaining: Some(0),
            },
            IdentityError::EmailNotVerified => AuthError::EmailNotVerified,
            IdentityError::Rejected(reason) => AuthError::InvalidToken(reason),
            IdentityError::InvalidCode => AuthError::MfaInvalidCode,
            IdentityError::ChallengeExpired => AuthError::MfaChallengeExpired,
            conflict @ IdentityError::Conflict => AuthError::BadRequest(conflict.to_string()),
            IdentityError::Invalid(message) => AuthError::BadRequest(message),
            IdentityError::Unavailable(message) => AuthError::Internal(message),
        }
    }
}

/// Tokens minted for a signed-in user
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// Profile without roles or permissions; the caller enriches it
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Password accepted, second factor outstanding
#[derive(Debug, Clone)]
pub struct PendingChallenge {
    pub user: UserProfile,
    pub temp_token: String,
    pub method: MfaMethod,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SignInOutcome {
    Authenticated(IssuedTokens),
    MfaRequired(PendingChallenge),
}

#[derive(Debug, Clone)]
pub struct MfaVerified {
    pub tokens: IssuedTokens,
    /// Set when a backup code was consumed
    pub backup_codes_remaining: Option<u32>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Check a password; may end in a second-factor challenge
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome, IdentityError>;

    /// Redeem a challenge token with a second-factor or backup code
    async fn verify_mfa(
        &self,
        temp_token: &str,
        method: MfaMethod,
        code: &str,
        is_backup_code: bool,
    ) -> Result<MfaVerified, IdentityError>;

    /// Exchange a refresh token, or a still-valid access token, for new tokens
    async fn refresh(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<IssuedTokens, IdentityError>;

    /// Revoke the session behind an access token; repeating it is harmless
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    /// Create an unconfirmed identity and send its verification message
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<UserProfile, IdentityError>;

    async fn confirm_email(&self, token: &str) -> Result<(), IdentityError>;

    /// Silently succeeds for unknown or already verified addresses
    async fn resend_verification(&self, email: &str) -> Result<(), IdentityError>;

    /// Resolve a bearer access token
    async fn get_user(&self, access_token: &str) -> Result<Identity, IdentityError>;
}
