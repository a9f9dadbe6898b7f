//! JWT token generation and validation
//!
//! Locally issued access tokens are HS256-signed JWTs. Each token carries a
//! unique `jti` for revocation and a `sid` tying it to the refresh grant
//! issued alongside it.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tollgate_core::IdentityConfig;
use uuid::Uuid;

/// Claims embedded in an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - unique token identifier for revocation
    pub jti: String,
    /// Session ID shared with the refresh grant
    pub sid: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// User's email address
    pub email: String,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Access token lifetime in seconds
    pub access_expiration_secs: u64,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from_identity(&IdentityConfig::default())
    }
}

impl JwtConfig {
    pub fn from_identity(config: &IdentityConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            access_expiration_secs: config.access_token_ttl_secs,
            issuer: config.jwt_issuer.clone(),
        }
    }
}

/// Sign a new access token for a user session
///
/// # Returns
///
/// * `Ok((String, Claims))` - Encoded token and the claims it carries
/// * `Err(JwtError)` - If the clock or the encoder fails
pub fn generate_access_token(
    config: &JwtConfig,
    user_id: &str,
    email: &str,
    session_id: &str,
) -> Result<(String, Claims), JwtError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = Claims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        sid: session_id.to_string(),
        iat: now,
        exp: now + config.access_expiration_secs,
        email: email.to_string(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;

    Ok((token, claims))
}

/// Validate an access token and extract its claims
///
/// Expiry is checked with zero leeway: a token is dead the second its `exp`
/// passes.
pub fn validate_access_token(config: &JwtConfig, token: &str) -> Result<Claims, JwtError> {
    decode_claims(config, token, true)
}

/// Decode claims without enforcing expiry, e.g. to revoke a token on sign-out
pub fn decode_expired_ok(config: &JwtConfig, token: &str) -> Result<Claims, JwtError> {
    decode_claims(config, token, false)
}

fn decode_claims(config: &JwtConfig, token: &str, check_exp: bool) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.leeway = 0;
    validation.validate_exp = check_exp;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        _ => JwtError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_validate_token() {
        let config = JwtConfig::default();
        let (token, issued) =
            generate_access_token(&config, "user-1", "ada@example.com", "sid-1").unwrap();

        let claims = validate_access_token(&config, &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.sid, "sid-1");
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.iss, "tollgate");
    }

    #[test]
    fn test_wrong_secret() {
        let signer = JwtConfig {
            secret: "secret1".to_string(),
            ..Default::default()
        };
        let verifier = JwtConfig {
            secret: "secret2".to_string(),
            ..Default::default()
        };

        let (token, _) = generate_access_token(&signer, "u", "u@example.com", "s").unwrap();
        let result = validate_access_token(&verifier, &token);
        assert!(matches!(result, Err(JwtError::InvalidSignature)));
    }

    #[test]
    fn test_expired_token() {
        let config = JwtConfig::default();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = Claims {
            iss: config.issuer.clone(),
            sub: "user-1".to_string(),
            jti: Uuid::new_v4().to_string(),
            sid: "sid".to_string(),
            iat: now - 7200,
            exp: now - 3600,
            email: "ada@example.com".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            validate_access_token(&config, &token),
            Err(JwtError::ExpiredToken)
        ));
        let decoded = decode_expired_ok(&config, &token).unwrap();
        assert_eq!(decoded.sub, "user-1");
    }

    #[test]
    fn test_garbage_token() {
        let config = JwtConfig::default();
        assert!(matches!(
            validate_access_token(&config, "invalid.token.here"),
            Err(JwtError::InvalidToken)
        ));
    }
}
