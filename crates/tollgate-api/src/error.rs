//! HTTP error responses
//!
//! Handlers and middleware return `AppError`; it renders the
//! `{ "error": { "code", "message", "details"? } }` envelope with the status
//! of the wrapped [`AuthError`], plus `Retry-After` and
//! `X-RateLimit-Remaining` when the error carries them.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tollgate_core::wire::{ErrorEnvelope, HEADER_RATE_LIMIT_REMAINING, HEADER_RETRY_AFTER};
use tollgate_core::AuthError;
use tracing::error;

use crate::identity::IdentityError;

#[derive(Debug)]
pub struct AppError {
    error: AuthError,
    details: Option<String>,
}

impl AppError {
    pub fn new(error: AuthError) -> Self {
        Self {
            error,
            details: None,
        }
    }

    /// Extra context for the envelope; callers decide whether it may be shown
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn auth_error(&self) -> &AuthError {
        &self.error
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(AuthError::BadRequest(message.into()))
    }
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        Self::new(error)
    }
}

impl From<IdentityError> for AppError {
    fn from(error: IdentityError) -> Self {
        Self::new(error.into())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::bad_request(format!("Validation failed: {errors}"))
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if let AuthError::Internal(reason) = &self.error {
            error!(error = %reason, "Request failed with internal error");
        }

        let mut envelope = ErrorEnvelope::from(&self.error);
        if let Some(details) = self.details {
            envelope = envelope.with_details(details);
        }

        let mut response = (status, Json(envelope)).into_response();

        let headers = response.headers_mut();
        if let Some(retry_after) = self.error.retry_after() {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            headers.insert(HEADER_RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        // Lockout and failed sign-in counts take the place of the limiter's count
        if let Some(remaining) = self.error.remaining_attempts() {
            headers.insert(HEADER_RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
        }

        response
    }
}
