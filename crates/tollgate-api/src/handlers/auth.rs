//! Authentication endpoints
//!
//! Thin adapters between the wire types and the configured
//! [`IdentityProvider`](crate::identity::IdentityProvider). Every outcome is
//! recorded in the audit trail.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use tollgate_core::wire::{
    ErrorEnvelope, LoginRequest, LoginResponse, MessageResponse, MfaVerifyRequest,
    MfaVerifyResponse, RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
    ResendVerificationRequest, VerifyEmailRequest,
};
use tollgate_core::{AuthError, UserProfile};
use tracing::{debug, warn};
use validator::Validate;

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::{hash_token, TokenValidator};
use crate::error::AppError;
use crate::identity::{IdentityError, SignInOutcome};
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Attach roles and permissions, warming the session's permission cache
async fn with_permissions(
    state: &AppState,
    access_token: &str,
    mut user: UserProfile,
) -> Result<UserProfile, AppError> {
    let set = state
        .permissions
        .resolve_cached(&hash_token(access_token), &user.id)
        .await?;
    user.roles = set.roles().cloned().collect();
    user.permissions = set.union().into_iter().collect();
    Ok(user)
}

fn audit_backend_outage(operation: &str, err: &IdentityError) {
    if let IdentityError::Unavailable(reason) = err {
        audit_log(&AuditEvent::IdentityBackendUnavailable {
            operation: operation.to_string(),
            reason: reason.clone(),
        });
    }
}

/// Sign in with email and password
///
/// When the account has a second factor, the response carries
/// `requiresMfa: true`, the challenge token in `token`, and the challenge
/// expiry in `expiresAt`.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in, or second factor required", body = LoginResponse),
        (status = 400, description = "Malformed request", body = ErrorEnvelope),
        (status = 401, description = "Invalid credentials", body = ErrorEnvelope),
        (status = 403, description = "Email not verified", body = ErrorEnvelope),
        (status = 429, description = "Rate limited or account locked", body = ErrorEnvelope),
    )
)]
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(request) = payload?;
    request.validate()?;

    let ip_address = extract_ip_address(&headers);
    let user_agent = extract_user_agent(&headers);

    match state.identity.sign_in(&request.email, &request.password).await {
        Ok(SignInOutcome::Authenticated(tokens)) => {
            let user = with_permissions(&state, &tokens.access_token, tokens.user).await?;
            audit_log(&AuditEvent::LoginSuccess {
                user_id: user.id.clone(),
                email: user.email.clone(),
                ip_address,
                user_agent,
            });
            Ok(Json(LoginResponse {
                user,
                token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                expires_at: Some(tokens.expires_at),
                requires_mfa: false,
                mfa_method: None,
            }))
        }
        Ok(SignInOutcome::MfaRequired(challenge)) => {
            audit_log(&AuditEvent::MfaChallengeIssued {
                user_id: challenge.user.id.clone(),
                method: challenge.method.to_string(),
                ip_address,
            });
            Ok(Json(LoginResponse {
                user: challenge.user,
                token: challenge.temp_token,
                refresh_token: None,
                expires_at: Some(challenge.expires_at),
                requires_mfa: true,
                mfa_method: Some(challenge.method),
            }))
        }
        Err(err) => {
            match &err {
                IdentityError::Locked { retry_after } => audit_log(&AuditEvent::AccountLocked {
                    email: request.email.clone(),
                    retry_after_secs: retry_after.as_secs(),
                    ip_address,
                }),
                IdentityError::Unavailable(_) => audit_backend_outage("sign_in", &err),
                other => audit_log(&AuditEvent::LoginFailure {
                    email: request.email.clone(),
                    reason: other.to_string(),
                    remaining_attempts: match other {
                        IdentityError::InvalidCredentials { remaining_attempts } => {
                            *remaining_attempts
                        }
                        _ => None,
                    },
                    ip_address,
                    user_agent,
                }),
            }
            Err(err.into())
        }
    }
}

/// Complete a second-factor challenge
///
/// The challenge token from the login response is sent as the bearer token.
#[utoipa::path(
    post,
    path = "/api/auth/2fa/verify",
    tag = "auth",
    request_body = MfaVerifyRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Second factor accepted", body = MfaVerifyResponse),
        (status = 400, description = "Malformed request", body = ErrorEnvelope),
        (status = 401, description = "Wrong code or expired challenge", body = ErrorEnvelope),
    )
)]
pub async fn verify_mfa_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<MfaVerifyRequest>, JsonRejection>,
) -> Result<Json<MfaVerifyResponse>, AppError> {
    let temp_token = TokenValidator::extract_token(&headers)?;
    let Json(request) = payload?;
    request.validate()?;

    let ip_address = extract_ip_address(&headers);

    let verified = state
        .identity
        .verify_mfa(&temp_token, request.method, &request.code, request.is_backup_code)
        .await
        .inspect_err(|err| {
            audit_backend_outage("verify_mfa", err);
            audit_log(&AuditEvent::MfaFailure {
                reason: err.to_string(),
                ip_address: ip_address.clone(),
                user_agent: extract_user_agent(&headers),
            });
        })?;

    let tokens = verified.tokens;
    let user = with_permissions(&state, &tokens.access_token, tokens.user).await?;
    audit_log(&AuditEvent::MfaVerified {
        user_id: user.id.clone(),
        used_backup_code: request.is_backup_code,
        ip_address,
    });

    Ok(Json(MfaVerifyResponse {
        user,
        token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_at: tokens.expires_at,
        backup_codes_remaining: verified.backup_codes_remaining,
    }))
}

/// Exchange the current session for fresh tokens
///
/// Accepts the access token as bearer, a `refreshToken` in the body, or both.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body(content = RefreshRequest, description = "Optional refresh token"),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "New tokens issued", body = RefreshResponse),
        (status = 401, description = "Session can no longer be refreshed", body = ErrorEnvelope),
    )
)]
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Json<RefreshResponse>, AppError> {
    let access_token = TokenValidator::extract_token(&headers).ok();
    let refresh_token = payload.and_then(|Json(body)| body.refresh_token);
    if access_token.is_none() && refresh_token.is_none() {
        return Err(AuthError::MissingToken.into());
    }

    let ip_address = extract_ip_address(&headers);
    let tokens = state
        .identity
        .refresh(access_token.as_deref(), refresh_token.as_deref())
        .await
        .inspect_err(|err| {
            audit_backend_outage("refresh", err);
            audit_log(&AuditEvent::RefreshFailure {
                reason: err.to_string(),
                ip_address: ip_address.clone(),
            });
        })?;

    if let Some(previous) = &access_token {
        state.permissions.invalidate(&hash_token(previous)).await;
    }
    audit_log(&AuditEvent::TokenRefresh {
        user_id: tokens.user.id.clone(),
        ip_address,
    });

    Ok(Json(RefreshResponse {
        token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_at: tokens.expires_at,
    }))
}

/// End the session behind the bearer token
///
/// Best effort: a backend failure is logged and the call still succeeds.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Signed out", body = MessageResponse),
        (status = 401, description = "No token supplied", body = ErrorEnvelope),
    )
)]
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let token = TokenValidator::extract_token(&headers)?;
    let identity = state.identity.get_user(&token).await.ok();

    if let Err(err) = state.identity.sign_out(&token).await {
        audit_backend_outage("sign_out", &err);
        warn!(error = %err, "Identity backend sign-out failed");
    }
    state.permissions.invalidate(&hash_token(&token)).await;

    match identity {
        Some(identity) => audit_log(&AuditEvent::Logout {
            user_id: identity.id,
            email: identity.email,
            ip_address: extract_ip_address(&headers),
        }),
        None => debug!("Logout with a token that no longer resolves"),
    }

    Ok(Json(MessageResponse::ok("Signed out")))
}

/// Create an account; no session is started until the email is verified
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Invalid input or email taken", body = ErrorEnvelope),
        (status = 429, description = "Rate limited", body = ErrorEnvelope),
    )
)]
pub async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    request.validate()?;

    let ip_address = extract_ip_address(&headers);
    let user_agent = extract_user_agent(&headers);

    let user = state
        .identity
        .sign_up(&request.email, &request.password, request.name.as_deref())
        .await
        .inspect_err(|err| {
            audit_backend_outage("sign_up", err);
            audit_log(&AuditEvent::RegistrationFailure {
                email: request.email.clone(),
                reason: err.to_string(),
                ip_address: ip_address.clone(),
                user_agent: user_agent.clone(),
            });
        })?;

    audit_log(&AuditEvent::RegistrationSuccess {
        user_id: user.id.clone(),
        email: user.email.clone(),
        ip_address,
        user_agent,
    });

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user,
            message: "Registration successful. Check your email to verify your account."
                .to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    tag = "auth",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorEnvelope),
    )
)]
pub async fn verify_email_handler(
    State(state): State<AppState>,
    payload: Result<Json<VerifyEmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    request.validate()?;

    state.identity.confirm_email(&request.token).await.inspect_err(|err| {
        audit_backend_outage("confirm_email", err);
    })?;
    Ok(Json(MessageResponse::ok("Email verified")))
}

/// Send a new verification message
///
/// Answers 200 whether or not the address is registered.
#[utoipa::path(
    post,
    path = "/api/auth/resend-verification",
    tag = "auth",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Accepted", body = MessageResponse),
        (status = 400, description = "Malformed email", body = ErrorEnvelope),
        (status = 429, description = "Rate limited", body = ErrorEnvelope),
    )
)]
pub async fn resend_verification_handler(
    State(state): State<AppState>,
    payload: Result<Json<ResendVerificationRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    request.validate()?;

    if let Err(err) = state.identity.resend_verification(&request.email).await {
        audit_backend_outage("resend_verification", &err);
        warn!(error = %err, "Verification resend failed");
    }
    Ok(Json(MessageResponse::ok(
        "If the address is registered and unverified, a verification email is on its way",
    )))
}

/// The caller as seen by the route guard
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current caller with roles and permissions", body = UserProfile),
        (status = 401, description = "Missing or invalid token", body = ErrorEnvelope),
    )
)]
pub async fn me_handler(context: AuthContext) -> Json<UserProfile> {
    Json(context.profile())
}
