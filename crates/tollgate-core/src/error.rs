//! Authentication error taxonomy
//!
//! Every boundary in Tollgate speaks `Result<T, AuthError>`. Transport-specific
//! shapes (HTTP status codes, JSON envelopes, backend errors) are parsed into an
//! `AuthError` once, at the edge, and never leak inward.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Machine-readable error codes shared by the client and the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingToken,
    InvalidToken,
    InvalidCredentials,
    RateLimitExceeded,
    EmailNotVerified,
    MfaRequired,
    MfaInvalidCode,
    MfaChallengeExpired,
    SessionExpired,
    Forbidden,
    BadRequest,
    Cancelled,
    InternalError,
}

impl ErrorCode {
    /// Taxonomy name, e.g. `RATE_LIMIT_EXCEEDED`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingToken => "MISSING_TOKEN",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            ErrorCode::MfaRequired => "MFA_REQUIRED",
            ErrorCode::MfaInvalidCode => "MFA_INVALID_CODE",
            ErrorCode::MfaChallengeExpired => "MFA_CHALLENGE_EXPIRED",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Code carried in the HTTP error envelope (`{ error: { code } }`)
    pub fn wire_code(&self) -> &'static str {
        match self {
            ErrorCode::MissingToken => "auth/missing-token",
            ErrorCode::InvalidToken => "auth/unauthorized",
            ErrorCode::InvalidCredentials => "auth/invalid-credentials",
            ErrorCode::RateLimitExceeded => "rate-limit/exceeded",
            ErrorCode::EmailNotVerified => "auth/email-not-verified",
            ErrorCode::MfaRequired => "auth/mfa-required",
            ErrorCode::MfaInvalidCode => "auth/mfa-invalid-code",
            ErrorCode::MfaChallengeExpired => "auth/mfa-challenge-expired",
            ErrorCode::SessionExpired => "auth/session-expired",
            ErrorCode::Forbidden => "auth/forbidden",
            ErrorCode::BadRequest => "request/invalid",
            ErrorCode::Cancelled => "auth/cancelled",
            ErrorCode::InternalError => "server/internal-error",
        }
    }

    /// Parse a wire code back into a taxonomy code
    pub fn from_wire(code: &str) -> Option<Self> {
        let code = match code {
            "auth/missing-token" => ErrorCode::MissingToken,
            "auth/unauthorized" => ErrorCode::InvalidToken,
            "auth/invalid-credentials" => ErrorCode::InvalidCredentials,
            "rate-limit/exceeded" => ErrorCode::RateLimitExceeded,
            "auth/email-not-verified" => ErrorCode::EmailNotVerified,
            "auth/mfa-required" => ErrorCode::MfaRequired,
            "auth/mfa-invalid-code" => ErrorCode::MfaInvalidCode,
            "auth/mfa-challenge-expired" => ErrorCode::MfaChallengeExpired,
            "auth/session-expired" => ErrorCode::SessionExpired,
            "auth/forbidden" => ErrorCode::Forbidden,
            "request/invalid" => ErrorCode::BadRequest,
            "auth/cancelled" => ErrorCode::Cancelled,
            "server/internal-error" => ErrorCode::InternalError,
            _ => return None,
        };
        Some(code)
    }

    /// HTTP status used when this code crosses the wire
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::MissingToken
            | ErrorCode::InvalidToken
            | ErrorCode::InvalidCredentials
            | ErrorCode::MfaRequired
            | ErrorCode::MfaInvalidCode
            | ErrorCode::MfaChallengeExpired
            | ErrorCode::SessionExpired => 401,
            ErrorCode::EmailNotVerified | ErrorCode::Forbidden => 403,
            ErrorCode::RateLimitExceeded => 429,
            ErrorCode::BadRequest => 400,
            ErrorCode::Cancelled => 409,
            ErrorCode::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed authentication failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authentication token is missing")]
    MissingToken,

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Invalid email or password")]
    InvalidCredentials { remaining_attempts: Option<u32> },

    #[error("Too many requests")]
    RateLimited {
        retry_after: Option<Duration>,
        remaining: Option<u32>,
    },

    #[error("Email address has not been verified")]
    EmailNotVerified,

    #[error("Multi-factor authentication is required")]
    MfaRequired,

    #[error("Invalid verification code")]
    MfaInvalidCode,

    #[error("Verification challenge has expired")]
    MfaChallengeExpired,

    #[error("{0}")]
    SessionExpired(String),

    #[error("Missing required permission: {permission}")]
    Forbidden { permission: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::MissingToken => ErrorCode::MissingToken,
            AuthError::InvalidToken(_) => ErrorCode::InvalidToken,
            AuthError::InvalidCredentials { .. } => ErrorCode::InvalidCredentials,
            AuthError::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            AuthError::EmailNotVerified => ErrorCode::EmailNotVerified,
            AuthError::MfaRequired => ErrorCode::MfaRequired,
            AuthError::MfaInvalidCode => ErrorCode::MfaInvalidCode,
            AuthError::MfaChallengeExpired => ErrorCode::MfaChallengeExpired,
            AuthError::SessionExpired(_) => ErrorCode::SessionExpired,
            AuthError::Forbidden { .. } => ErrorCode::Forbidden,
            AuthError::BadRequest(_) => ErrorCode::BadRequest,
            AuthError::Cancelled => ErrorCode::Cancelled,
            AuthError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }

    /// Message safe to show an end user
    ///
    /// Internal details and permission names are never part of it.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::InvalidToken(_) => "Invalid or expired token".to_string(),
            AuthError::Forbidden { .. } => {
                "You do not have permission to perform this action".to_string()
            }
            AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AuthError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn remaining_attempts(&self) -> Option<u32> {
        match self {
            AuthError::RateLimited { remaining, .. } => *remaining,
            AuthError::InvalidCredentials { remaining_attempts } => *remaining_attempts,
            _ => None,
        }
    }

    /// Rebuild a typed error from a wire code and message
    pub fn from_wire(
        code: ErrorCode,
        message: impl Into<String>,
        retry_after: Option<Duration>,
        remaining: Option<u32>,
    ) -> Self {
        let message = message.into();
        match code {
            ErrorCode::MissingToken => AuthError::MissingToken,
            ErrorCode::InvalidToken => AuthError::InvalidToken(message),
            ErrorCode::InvalidCredentials => AuthError::InvalidCredentials {
                remaining_attempts: remaining,
            },
            ErrorCode::RateLimitExceeded => AuthError::RateLimited {
                retry_after,
                remaining,
            },
            ErrorCode::EmailNotVerified => AuthError::EmailNotVerified,
            ErrorCode::MfaRequired => AuthError::MfaRequired,
            ErrorCode::MfaInvalidCode => AuthError::MfaInvalidCode,
            ErrorCode::MfaChallengeExpired => AuthError::MfaChallengeExpired,
            ErrorCode::SessionExpired => AuthError::SessionExpired(message),
            ErrorCode::Forbidden => AuthError::Forbidden {
                permission: message,
            },
            ErrorCode::BadRequest => AuthError::BadRequest(message),
            ErrorCode::Cancelled => AuthError::Cancelled,
            ErrorCode::InternalError => AuthError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 13] = [
        ErrorCode::MissingToken,
        ErrorCode::InvalidToken,
        ErrorCode::InvalidCredentials,
        ErrorCode::RateLimitExceeded,
        ErrorCode::EmailNotVerified,
        ErrorCode::MfaRequired,
        ErrorCode::MfaInvalidCode,
        ErrorCode::MfaChallengeExpired,
        ErrorCode::SessionExpired,
        ErrorCode::Forbidden,
        ErrorCode::BadRequest,
        ErrorCode::Cancelled,
        ErrorCode::InternalError,
    ];

    #[test]
    fn test_wire_code_lookup() {
        for code in ALL {
            assert_eq!(ErrorCode::from_wire(code.wire_code()), Some(code));
        }
        assert_eq!(ErrorCode::from_wire("auth/nope"), None);
    }

    #[test]
    fn test_expired_token_maps_to_unauthorized() {
        let err = AuthError::InvalidToken("Token has expired".to_string());
        assert_eq!(err.code().wire_code(), "auth/unauthorized");
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn test_statuses() {
        assert_eq!(AuthError::MissingToken.http_status(), 401);
        assert_eq!(
            AuthError::Forbidden {
                permission: "VIEW_PROJECTS".to_string()
            }
            .http_status(),
            403
        );
        assert_eq!(
            AuthError::RateLimited {
                retry_after: None,
                remaining: None
            }
            .http_status(),
            429
        );
        assert_eq!(AuthError::Internal("boom".to_string()).http_status(), 500);
    }

    #[test]
    fn test_public_message_hides_details() {
        let forbidden = AuthError::Forbidden {
            permission: "DELETE_TEAM".to_string(),
        };
        assert!(!forbidden.public_message().contains("DELETE_TEAM"));

        let internal = AuthError::Internal("redis: connection refused".to_string());
        assert_eq!(internal.public_message(), "Internal server error");
    }

    #[test]
    fn test_from_wire_keeps_rate_limit_metadata() {
        let err = AuthError::from_wire(
            ErrorCode::RateLimitExceeded,
            "Too many requests",
            Some(Duration::from_secs(900)),
            Some(0),
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(900)));
        assert_eq!(err.remaining_attempts(), Some(0));
    }
}
