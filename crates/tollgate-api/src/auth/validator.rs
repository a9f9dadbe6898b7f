//! Bearer credential validation
//!
//! The validator fails closed: a credential the identity backend cannot vouch
//! for is never accepted. A backend outage surfaces as `INTERNAL_ERROR` so it
//! is not mistaken for a bad token.

use axum::http::{header, HeaderMap};
use std::sync::Arc;
use tollgate_core::{AuthError, Identity};
use tracing::{debug, error};

use crate::identity::{IdentityError, IdentityProvider};

/// Cookie consulted when no Authorization header is present
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Clone)]
pub struct TokenValidator {
    provider: Arc<dyn IdentityProvider>,
}

impl TokenValidator {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Pull the raw token out of `Authorization: Bearer` or the access cookie
    pub fn extract_token(headers: &HeaderMap) -> Result<String, AuthError> {
        if let Some(value) = headers.get(header::AUTHORIZATION) {
            let value = value
                .to_str()
                .map_err(|_| AuthError::InvalidToken("Malformed Authorization header".to_string()))?;
            let token = value
                .strip_prefix("Bearer ")
                .ok_or_else(|| AuthError::InvalidToken("Expected a Bearer token".to_string()))?
                .trim();
            if token.is_empty() {
                return Err(AuthError::MissingToken);
            }
            return Ok(token.to_string());
        }

        cookie_value(headers, ACCESS_TOKEN_COOKIE)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)
    }

    /// Validate the credential carried by a request
    pub async fn validate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = Self::extract_token(headers)?;
        self.validate_token(&token).await
    }

    pub async fn validate_token(&self, token: &str) -> Result<Identity, AuthError> {
        match self.provider.get_user(token).await {
            Ok(identity) => Ok(identity),
            Err(IdentityError::Unavailable(reason)) => {
                error!(error = %reason, "Identity backend unavailable during token validation");
                Err(AuthError::Internal(reason))
            }
            Err(e) => {
                debug!(error = %e, "Token rejected");
                Err(AuthError::InvalidToken(e.to_string()))
            }
        }
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}
