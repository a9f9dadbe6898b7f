//! Per-route request authorization
//!
//! A [`RouteGuard`] describes what a route demands and is attached with
//! [`RouteGuard::apply`]. For every request it runs, in order:
//!
//! 1. the rate-limit gate, when configured. A limited request gets a 429 with
//!    rate-limit headers; otherwise the headers are added to the response.
//! 2. token validation, when authentication is required. A missing or invalid
//!    token gets a 401; a validator failure gets a 500.
//! 3. the permission check, when a permission is required. Failing it gets
//!    a 403.
//! 4. the handler, with an [`AuthContext`] in the request extensions.

pub mod context;

pub use context::AuthContext;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tollgate_core::wire::{HEADER_RATE_LIMIT_LIMIT, HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_RESET};
use tollgate_core::{AuthError, Permission};
use tracing::{debug, error};

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::{hash_token, TokenValidator};
use crate::error::AppError;
use crate::rate_limit::{client_key, get_headers, now_ms, RateLimitDecision, RateLimitOptions};
use crate::state::AppState;

#[derive(Debug, Clone)]
struct RateLimitRule {
    scope: String,
    options: RateLimitOptions,
}

/// What a route requires before its handler runs
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    authenticate: bool,
    rate_limit: Option<RateLimitRule>,
    permission: Option<Permission>,
}

impl RouteGuard {
    /// No token required; useful with [`RouteGuard::rate_limit`] alone
    pub fn public() -> Self {
        Self::default()
    }

    pub fn authenticated() -> Self {
        Self {
            authenticate: true,
            ..Self::default()
        }
    }

    /// Limit requests per client IP; `scope` separates counters between routes
    pub fn rate_limit(mut self, scope: impl Into<String>, options: RateLimitOptions) -> Self {
        self.rate_limit = Some(RateLimitRule {
            scope: scope.into(),
            options,
        });
        self
    }

    /// Require a permission; implies authentication
    pub fn require_permission(mut self, permission: Permission) -> Self {
        self.authenticate = true;
        self.permission = Some(permission);
        self
    }

    pub fn apply<S>(self, router: Router<S>, state: AppState) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let guarded = GuardedState {
            state,
            guard: Arc::new(self),
        };
        router.route_layer(from_fn_with_state(guarded, route_guard))
    }
}

#[derive(Clone)]
struct GuardedState {
    state: AppState,
    guard: Arc<RouteGuard>,
}

async fn route_guard(
    State(guarded): State<GuardedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let GuardedState { state, guard } = guarded;

    let mut allowed = None;
    if let Some(rule) = &guard.rate_limit {
        let key = client_key(&state.config.rate_limit.key_prefix, &rule.scope, request.headers());
        let now = now_ms();
        let decision = state.limiter.check(&key, rule.options).await;

        if decision.limited {
            audit_log(&AuditEvent::RateLimited {
                key,
                resource: request.uri().path().to_string(),
                limit: decision.limit,
                ip_address: extract_ip_address(request.headers()),
            });
            let mut response = AppError::from(AuthError::RateLimited {
                retry_after: Some(decision.retry_after(now)),
                remaining: Some(0),
            })
            .into_response();
            attach_rate_limit_headers(&mut response, &rule.options, &decision, now);
            return response;
        }
        allowed = Some((rule.options, decision, now));
    }

    let mut response = match authorize(&state, &guard, &mut request).await {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    };

    if let Some((options, decision, now)) = allowed {
        attach_rate_limit_headers(&mut response, &options, &decision, now);
    }
    response
}

/// Validate the caller and check the required permission
async fn authorize(
    state: &AppState,
    guard: &RouteGuard,
    request: &mut Request,
) -> Result<(), AppError> {
    if !guard.authenticate {
        return Ok(());
    }

    let path = request.uri().path().to_string();
    let ip_address = extract_ip_address(request.headers());

    let token = TokenValidator::extract_token(request.headers()).inspect_err(|e| {
        debug!(path = %path, error = %e, "Rejected request without usable credential");
    })?;

    let identity = match state.validator.validate_token(&token).await {
        Ok(identity) => identity,
        Err(AuthError::Internal(reason)) => {
            audit_log(&AuditEvent::IdentityBackendUnavailable {
                operation: "validate_token".to_string(),
                reason: reason.clone(),
            });
            return Err(AuthError::Internal(reason).into());
        }
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                resource: path,
                reason: e.to_string(),
                ip_address,
                user_agent: extract_user_agent(request.headers()),
            });
            return Err(e.into());
        }
    };

    let session_key = hash_token(&token);
    let permissions = state
        .permissions
        .resolve_cached(&session_key, &identity.id)
        .await?;

    if let Some(required) = &guard.permission {
        if !permissions.grants(required) {
            audit_log(&AuditEvent::AccessDenied {
                user_id: identity.id.clone(),
                email: identity.email.clone(),
                resource: path,
                required_permission: required.to_string(),
                ip_address,
            });
            let err = AppError::from(AuthError::Forbidden {
                permission: required.to_string(),
            });
            return Err(if state.config.environment.is_production() {
                err
            } else {
                err.with_details(format!("Missing permission: {required}"))
            });
        }
    }

    request.extensions_mut().insert(AuthContext {
        user_id: identity.id,
        email: identity.email,
        roles: permissions.roles().cloned().collect(),
        permissions: permissions.union().into_iter().collect(),
        session_key,
    });
    Ok(())
}

/// Limit, remaining and reset headers; a remaining count already set
/// downstream (account lockout) is kept
fn attach_rate_limit_headers(
    response: &mut Response,
    options: &RateLimitOptions,
    decision: &RateLimitDecision,
    now: u64,
) {
    let computed = get_headers(options, now);
    let headers = response.headers_mut();
    headers.insert(HEADER_RATE_LIMIT_LIMIT, HeaderValue::from(computed.limit));
    headers.insert(HEADER_RATE_LIMIT_RESET, HeaderValue::from(computed.reset));
    headers
        .entry(HEADER_RATE_LIMIT_REMAINING)
        .or_insert_with(|| HeaderValue::from(decision.remaining));
}

/// Response for a panic caught at the top of the stack
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };

    error!(panic = %detail, "Request handler panicked");
    AppError::from(AuthError::Internal(detail)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_permission_implies_authentication() {
        let guard = RouteGuard::public().require_permission(Permission::parse("ADMIN").unwrap());
        assert!(guard.authenticate);
        assert!(!RouteGuard::public().authenticate);
    }

    #[test]
    fn test_remaining_header_is_not_overwritten() {
        let mut response = AppError::from(AuthError::RateLimited {
            retry_after: Some(Duration::from_secs(900)),
            remaining: Some(0),
        })
        .into_response();
        let options = RateLimitOptions::new(Duration::from_secs(900), 10);
        let decision = RateLimitDecision {
            limited: false,
            limit: 10,
            remaining: 7,
            reset_at_ms: 1_900_000,
        };

        attach_rate_limit_headers(&mut response, &options, &decision, 1_000_000);

        assert_eq!(response.headers()[HEADER_RATE_LIMIT_REMAINING], "0");
        assert_eq!(response.headers()[HEADER_RATE_LIMIT_LIMIT], "10");
        assert_eq!(response.headers()[HEADER_RATE_LIMIT_RESET], "1900");
    }

    #[tokio::test]
    async fn test_panic_response_is_internal_envelope() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "server/internal-error");
    }
}
