//! Security audit trail
//!
//! Every authentication decision worth reviewing later is emitted as one
//! INFO record on the `audit` target. The record carries the event serialized
//! as tagged JSON (`event_type`) plus a few flat fields for filtering.

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        user_id: String,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    LoginFailure {
        email: String,
        reason: String,
        remaining_attempts: Option<u32>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Password accepted, second factor requested
    MfaChallengeIssued {
        user_id: String,
        method: String,
        ip_address: Option<String>,
    },

    MfaVerified {
        user_id: String,
        used_backup_code: bool,
        ip_address: Option<String>,
    },

    MfaFailure {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    Logout {
        user_id: String,
        email: String,
        ip_address: Option<String>,
    },

    TokenRefresh {
        user_id: String,
        ip_address: Option<String>,
    },

    RefreshFailure {
        reason: String,
        ip_address: Option<String>,
    },

    RegistrationSuccess {
        user_id: String,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    AccessDenied {
        user_id: String,
        email: String,
        resource: String,
        required_permission: String,
        ip_address: Option<String>,
    },

    InvalidToken {
        resource: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RateLimited {
        key: String,
        resource: String,
        limit: u32,
        ip_address: Option<String>,
    },

    AccountLocked {
        email: String,
        retry_after_secs: u64,
        ip_address: Option<String>,
    },

    /// Identity backend could not be reached
    IdentityBackendUnavailable {
        operation: String,
        reason: String,
    },
}

/// Emit one audit record
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::LoginSuccess {
            user_id,
            email,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                ip_address = ?ip_address,
                "Login successful"
            );
        }
        AuditEvent::LoginFailure {
            email,
            reason,
            remaining_attempts,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                reason = %reason,
                remaining_attempts = ?remaining_attempts,
                ip_address = ?ip_address,
                "Login failed"
            );
        }
        AuditEvent::MfaChallengeIssued {
            user_id,
            method,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                method = %method,
                ip_address = ?ip_address,
                "MFA challenge issued"
            );
        }
        AuditEvent::MfaVerified {
            user_id,
            used_backup_code,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                used_backup_code = %used_backup_code,
                ip_address = ?ip_address,
                "MFA verified"
            );
        }
        AuditEvent::MfaFailure {
            reason, ip_address, ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                reason = %reason,
                ip_address = ?ip_address,
                "MFA verification failed"
            );
        }
        AuditEvent::Logout {
            user_id,
            email,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                ip_address = ?ip_address,
                "User logout"
            );
        }
        AuditEvent::TokenRefresh {
            user_id,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                ip_address = ?ip_address,
                "Token refresh"
            );
        }
        AuditEvent::RefreshFailure { reason, ip_address } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                reason = %reason,
                ip_address = ?ip_address,
                "Token refresh rejected"
            );
        }
        AuditEvent::RegistrationSuccess {
            user_id,
            email,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                email = %email,
                ip_address = ?ip_address,
                "Registration successful"
            );
        }
        AuditEvent::RegistrationFailure {
            email,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                reason = %reason,
                ip_address = ?ip_address,
                "Registration failed"
            );
        }
        AuditEvent::AccessDenied {
            user_id,
            resource,
            required_permission,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                resource = %resource,
                required_permission = %required_permission,
                ip_address = ?ip_address,
                "Access denied"
            );
        }
        AuditEvent::InvalidToken {
            resource,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                resource = %resource,
                reason = %reason,
                ip_address = ?ip_address,
                "Invalid token"
            );
        }
        AuditEvent::RateLimited {
            key,
            resource,
            limit,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                key = %key,
                resource = %resource,
                limit = %limit,
                ip_address = ?ip_address,
                "Rate limit exceeded"
            );
        }
        AuditEvent::AccountLocked {
            email,
            retry_after_secs,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                retry_after_secs = %retry_after_secs,
                ip_address = ?ip_address,
                "Account locked"
            );
        }
        AuditEvent::IdentityBackendUnavailable { operation, reason } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                operation = %operation,
                reason = %reason,
                "Identity backend unavailable"
            );
        }
    }
}

/// Client IP: first `X-Forwarded-For` hop, then `X-Real-IP`
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return Some(first.to_string());
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged() {
        let event = AuditEvent::AccessDenied {
            user_id: "u1".to_string(),
            email: "ada@example.com".to_string(),
            resource: "/api/projects".to_string(),
            required_permission: "VIEW_PROJECTS".to_string(),
            ip_address: None,
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "access_denied");
        assert_eq!(json["required_permission"], "VIEW_PROJECTS");
    }

    #[test]
    fn test_audit_log_every_kind() {
        audit_log(&AuditEvent::LoginFailure {
            email: "ada@example.com".to_string(),
            reason: "Invalid email or password".to_string(),
            remaining_attempts: Some(2),
            ip_address: Some("192.0.2.1".to_string()),
            user_agent: None,
        });
        audit_log(&AuditEvent::AccountLocked {
            email: "ada@example.com".to_string(),
            retry_after_secs: 900,
            ip_address: None,
        });
        audit_log(&AuditEvent::RateLimited {
            key: "tollgate:rl:auth:192.0.2.1".to_string(),
            resource: "/api/auth/login".to_string(),
            limit: 10,
            ip_address: Some("192.0.2.1".to_string()),
        });
    }

    #[test]
    fn test_extract_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.7".parse().unwrap());
        assert_eq!(extract_ip_address(&headers).as_deref(), Some("198.51.100.7"));

        headers.insert("x-forwarded-for", "203.0.113.1, 198.51.100.1".parse().unwrap());
        assert_eq!(extract_ip_address(&headers).as_deref(), Some("203.0.113.1"));
    }

    #[test]
    fn test_extract_missing_headers() {
        let headers = HeaderMap::new();
        assert_eq!(extract_ip_address(&headers), None);
        assert_eq!(extract_user_agent(&headers), None);
    }
}
