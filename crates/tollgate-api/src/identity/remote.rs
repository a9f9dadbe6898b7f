//! GoTrue-compatible identity provider over HTTP
//!
//! `IDENTITY_URL` points at the auth base (e.g. `https://<project>.supabase.co/auth/v1`).
//! Second factors use the factor challenge/verify endpoints with the
//! first-factor session; that session never leaves this process. Callers only
//! see an opaque challenge token.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use moka::future::Cache;
use std::time::Duration;
use tollgate_core::{Identity, IdentityConfig, MfaMethod, UserProfile};
use tracing::{debug, warn};

use super::{
    IdentityError, IdentityProvider, IssuedTokens, MfaVerified, PendingChallenge, SignInOutcome,
};
use crate::auth::{hash_token, random_token};

const DEFAULT_LOCKOUT_RETRY_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: GoTrueUser,
}

#[derive(Debug, Clone, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
    #[serde(default)]
    user_metadata: Value,
    #[serde(default)]
    app_metadata: Value,
    #[serde(default)]
    factors: Vec<GoTrueFactor>,
}

impl GoTrueUser {
    fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone().unwrap_or_default(),
            name: self
                .user_metadata
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            email_verified: self.email_confirmed_at.is_some(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    fn verified_factor(&self) -> Option<(&GoTrueFactor, MfaMethod)> {
        self.factors
            .iter()
            .filter(|f| f.status == "verified")
            .find_map(|f| match f.factor_type.as_str() {
                "totp" => Some((f, MfaMethod::Totp)),
                "phone" => Some((f, MfaMethod::Sms)),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GoTrueFactor {
    id: String,
    factor_type: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct GoTrueChallenge {
    id: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct GoTrueErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl GoTrueErrorBody {
    fn code(&self) -> &str {
        self.error_code
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or_default()
    }

    fn text(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "Identity service rejected the request".to_string())
    }
}

#[derive(Debug, Clone)]
struct PendingFactor {
    user: UserProfile,
    aal1_token: String,
    factor_id: String,
    challenge_id: String,
    method: MfaMethod,
    expires_at: DateTime<Utc>,
}

/// Open challenges kept at once; abandoned ones age out after the challenge TTL
const PENDING_CAPACITY: u64 = 10_000;

pub struct RemoteIdentityProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    access_token_ttl: Duration,
    mfa_challenge_ttl: Duration,
    pending: Cache<String, PendingFactor>,
}

impl RemoteIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| IdentityError::Invalid("IDENTITY_URL is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| IdentityError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            access_token_ttl: config.access_token_ttl(),
            mfa_challenge_ttl: config.mfa_challenge_ttl(),
            pending: Cache::builder()
                .max_capacity(PENDING_CAPACITY)
                .time_to_live(config.mfa_challenge_ttl())
                .build(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("apikey", key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, IdentityError> {
        let response = builder
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("Request failed: {e}")))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, retry_after, &body))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, IdentityError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("Failed to parse response: {e}")))
    }

    fn session_tokens(&self, session: GoTrueSession) -> IssuedTokens {
        let now = Utc::now();
        let expires_at = session
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| session.expires_in.map(|secs| now + ChronoDuration::seconds(secs)))
            .unwrap_or_else(|| {
                now + ChronoDuration::from_std(self.access_token_ttl)
                    .unwrap_or_else(|_| ChronoDuration::hours(1))
            });

        IssuedTokens {
            user: session.user.profile(),
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_at,
        }
    }

    async fn start_challenge(
        &self,
        session: GoTrueSession,
        factor_id: String,
        method: MfaMethod,
    ) -> Result<PendingChallenge, IdentityError> {
        let challenge: GoTrueChallenge = self
            .send_json(
                self.request(reqwest::Method::POST, &format!("/factors/{factor_id}/challenge"))
                    .bearer_auth(&session.access_token)
                    .json(&json!({})),
            )
            .await?;

        let local_ceiling = Utc::now()
            + ChronoDuration::from_std(self.mfa_challenge_ttl)
                .unwrap_or_else(|_| ChronoDuration::minutes(5));
        let expires_at = challenge
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map_or(local_ceiling, |remote| remote.min(local_ceiling));

        let temp_token = random_token();
        let user = session.user.profile();
        self.pending
            .insert(
                hash_token(&temp_token),
                PendingFactor {
                    user: user.clone(),
                    aal1_token: session.access_token,
                    factor_id,
                    challenge_id: challenge.id,
                    method,
                    expires_at,
                },
            )
            .await;

        debug!(user_id = %user.id, method = %method, "Started remote factor challenge");
        Ok(PendingChallenge {
            user,
            temp_token,
            method,
            expires_at,
        })
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome, IdentityError> {
        let session: GoTrueSession = self
            .send_json(
                self.request(reqwest::Method::POST, "/token?grant_type=password")
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;

        match session.user.verified_factor() {
            Some((factor, method)) => {
                let factor_id = factor.id.clone();
                let pending = self.start_challenge(session, factor_id, method).await?;
                Ok(SignInOutcome::MfaRequired(pending))
            }
            None => Ok(SignInOutcome::Authenticated(self.session_tokens(session))),
        }
    }

    async fn verify_mfa(
        &self,
        temp_token: &str,
        method: MfaMethod,
        code: &str,
        is_backup_code: bool,
    ) -> Result<MfaVerified, IdentityError> {
        if is_backup_code {
            return Err(IdentityError::Invalid(
                "Backup codes are not supported by the remote identity provider".to_string(),
            ));
        }

        let key = hash_token(temp_token);
        // The service may close a challenge before the local TTL does
        let pending = match self.pending.get(&key).await {
            Some(p) if p.expires_at > Utc::now() => p,
            Some(_) => {
                self.pending.invalidate(&key).await;
                return Err(IdentityError::ChallengeExpired);
            }
            None => return Err(IdentityError::ChallengeExpired),
        };
        if method != pending.method {
            return Err(IdentityError::Invalid(format!(
                "Challenge expects a {} code",
                pending.method
            )));
        }

        let result: Result<GoTrueSession, IdentityError> = self
            .send_json(
                self.request(
                    reqwest::Method::POST,
                    &format!("/factors/{}/verify", pending.factor_id),
                )
                .bearer_auth(&pending.aal1_token)
                .json(&json!({ "challenge_id": pending.challenge_id, "code": code.trim() })),
            )
            .await;

        match result {
            Ok(session) => {
                self.pending.invalidate(&key).await;
                let mut tokens = self.session_tokens(session);
                if tokens.user.email.is_empty() {
                    tokens.user = pending.user;
                }
                Ok(MfaVerified {
                    tokens,
                    backup_codes_remaining: None,
                })
            }
            Err(IdentityError::InvalidCode) => Err(IdentityError::InvalidCode),
            Err(err) => {
                self.pending.invalidate(&key).await;
                Err(err)
            }
        }
    }

    async fn refresh(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<IssuedTokens, IdentityError> {
        let Some(refresh_token) = refresh_token else {
            // GoTrue only rotates through the refresh grant
            let reason = if access_token.is_some() {
                "Refresh token required"
            } else {
                "Missing credentials"
            };
            return Err(IdentityError::Rejected(reason.to_string()));
        };

        let session: GoTrueSession = self
            .send_json(
                self.request(reqwest::Method::POST, "/token?grant_type=refresh_token")
                    .json(&json!({ "refresh_token": refresh_token })),
            )
            .await
            .map_err(|err| match err {
                IdentityError::InvalidCredentials { .. } => {
                    IdentityError::Rejected("Invalid refresh token".to_string())
                }
                other => other,
            })?;

        Ok(self.session_tokens(session))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let result = self
            .send(
                self.request(reqwest::Method::POST, "/logout")
                    .bearer_auth(access_token),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(IdentityError::Rejected(reason)) => {
                debug!(%reason, "Remote session already gone");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<UserProfile, IdentityError> {
        let body: Value = self
            .send_json(self.request(reqwest::Method::POST, "/signup").json(&json!({
                "email": email,
                "password": password,
                "data": { "name": name },
            })))
            .await?;

        // Autoconfirm deployments answer with a session, others with the bare user
        let user_value = body.get("user").cloned().unwrap_or(body);
        let user: GoTrueUser = serde_json::from_value(user_value)
            .map_err(|e| IdentityError::Unavailable(format!("Failed to parse user: {e}")))?;
        Ok(user.profile())
    }

    async fn confirm_email(&self, token: &str) -> Result<(), IdentityError> {
        self.send(
            self.request(reqwest::Method::POST, "/verify")
                .json(&json!({ "type": "email", "token_hash": token })),
        )
        .await
        .map(|_| ())
        .map_err(|err| match err {
            IdentityError::Rejected(_) | IdentityError::InvalidCredentials { .. } => {
                IdentityError::Invalid("Invalid or expired verification token".to_string())
            }
            other => other,
        })
    }

    async fn resend_verification(&self, email: &str) -> Result<(), IdentityError> {
        let result = self
            .send(
                self.request(reqwest::Method::POST, "/resend")
                    .json(&json!({ "type": "signup", "email": email })),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err @ (IdentityError::Unavailable(_) | IdentityError::Locked { .. })) => Err(err),
            Err(err) => {
                warn!(error = %err, "Resend verification refused by identity service");
                Ok(())
            }
        }
    }

    async fn get_user(&self, access_token: &str) -> Result<Identity, IdentityError> {
        let user: GoTrueUser = self
            .send_json(
                self.request(reqwest::Method::GET, "/user")
                    .bearer_auth(access_token),
            )
            .await
            .map_err(|err| match err {
                IdentityError::InvalidCredentials { .. } | IdentityError::Invalid(_) => {
                    IdentityError::Rejected("Invalid or expired token".to_string())
                }
                other => other,
            })?;

        Ok(Identity {
            id: user.id,
            email: user.email.unwrap_or_default(),
            app_metadata: user.app_metadata,
        })
    }
}

/// Translate a GoTrue error response
fn map_error(status: StatusCode, retry_after_secs: Option<u64>, body: &str) -> IdentityError {
    if status.is_server_error() {
        return IdentityError::Unavailable(format!("Identity service returned {status}"));
    }

    let parsed: GoTrueErrorBody = serde_json::from_str(body).unwrap_or_default();
    let text = parsed.text();

    match parsed.code() {
        "email_not_confirmed" => return IdentityError::EmailNotVerified,
        "mfa_verification_failed" | "mfa_verification_rejected" => {
            return IdentityError::InvalidCode
        }
        "mfa_challenge_expired" | "mfa_factor_not_found" => {
            return IdentityError::ChallengeExpired
        }
        "user_already_exists" | "email_exists" => return IdentityError::Conflict,
        "weak_password" | "validation_failed" | "email_address_invalid" => {
            return IdentityError::Invalid(text)
        }
        "invalid_credentials" => {
            return IdentityError::InvalidCredentials {
                remaining_attempts: None,
            }
        }
        "invalid_grant" if text.contains("Email not confirmed") => {
            return IdentityError::EmailNotVerified
        }
        "invalid_grant" => {
            return IdentityError::InvalidCredentials {
                remaining_attempts: None,
            }
        }
        _ => {}
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => IdentityError::Locked {
            retry_after: Duration::from_secs(retry_after_secs.unwrap_or(DEFAULT_LOCKOUT_RETRY_SECS)),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => IdentityError::Rejected(text),
        StatusCode::CONFLICT => IdentityError::Conflict,
        _ => IdentityError::Invalid(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::HeaderMap,
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap as StdHashMap;

    fn user_json(factors: Value) -> Value {
        json!({
            "id": "5b1c8a9e-0000-4000-8000-000000000001",
            "email": "ada@example.com",
            "email_confirmed_at": "2024-01-01T00:00:00Z",
            "user_metadata": { "name": "Ada" },
            "app_metadata": { "provider": "email" },
            "factors": factors,
        })
    }

    /// Minimal GoTrue stand-in: one user, password `correct horse 1`, TOTP code `123456`
    fn fake_gotrue(with_factor: bool) -> Router {
        let factors = if with_factor {
            json!([{ "id": "factor-1", "factor_type": "totp", "status": "verified" }])
        } else {
            json!([])
        };
        let user = user_json(factors);
        let token_user = user.clone();
        let verify_user = user.clone();

        Router::new()
            .route(
                "/token",
                post(
                    move |Query(params): Query<StdHashMap<String, String>>,
                          Json(body): Json<Value>| {
                        let user = token_user.clone();
                        async move {
                            let ok = match params.get("grant_type").map(String::as_str) {
                                Some("password") => body["password"] == "correct horse 1",
                                Some("refresh_token") => body["refresh_token"] == "refresh-1",
                                _ => false,
                            };
                            if ok {
                                (
                                    StatusCode::OK,
                                    Json(json!({
                                        "access_token": "aal1-token",
                                        "refresh_token": "refresh-2",
                                        "expires_in": 3600,
                                        "user": user,
                                    })),
                                )
                            } else {
                                (
                                    StatusCode::BAD_REQUEST,
                                    Json(json!({
                                        "error": "invalid_grant",
                                        "error_description": "Invalid login credentials",
                                    })),
                                )
                            }
                        }
                    },
                ),
            )
            .route(
                "/factors/:id/challenge",
                post(|Path(_id): Path<String>| async {
                    Json(json!({ "id": "challenge-1", "expires_at": Utc::now().timestamp() + 300 }))
                }),
            )
            .route(
                "/factors/:id/verify",
                post(move |Json(body): Json<Value>| {
                    let user = verify_user.clone();
                    async move {
                        if body["code"] == "123456" && body["challenge_id"] == "challenge-1" {
                            (
                                StatusCode::OK,
                                Json(json!({
                                    "access_token": "aal2-token",
                                    "refresh_token": "refresh-3",
                                    "expires_in": 3600,
                                    "user": user,
                                })),
                            )
                        } else {
                            (
                                StatusCode::UNPROCESSABLE_ENTITY,
                                Json(json!({
                                    "code": 422,
                                    "error_code": "mfa_verification_failed",
                                    "msg": "Invalid TOTP code entered",
                                })),
                            )
                        }
                    }
                }),
            )
            .route(
                "/user",
                get(move |headers: HeaderMap| {
                    let user = user.clone();
                    async move {
                        let bearer = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        if bearer == "Bearer aal2-token" || bearer == "Bearer aal1-token" {
                            (StatusCode::OK, Json(user))
                        } else {
                            (
                                StatusCode::UNAUTHORIZED,
                                Json(json!({ "code": 401, "error_code": "bad_jwt", "msg": "invalid JWT" })),
                            )
                        }
                    }
                }),
            )
            .route("/logout", post(|| async { StatusCode::NO_CONTENT }))
    }

    async fn provider_for(app: Router) -> RemoteIdentityProvider {
        provider_with_ttl(app, IdentityConfig::default().mfa_challenge_ttl_secs).await
    }

    async fn provider_with_ttl(app: Router, mfa_challenge_ttl_secs: u64) -> RemoteIdentityProvider {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = IdentityConfig {
            url: Some(format!("http://{addr}/")),
            api_key: Some("anon-key".to_string()),
            mfa_challenge_ttl_secs,
            ..Default::default()
        };
        RemoteIdentityProvider::new(&config).unwrap()
    }

    #[test]
    fn test_map_error_codes() {
        assert_eq!(
            map_error(
                StatusCode::BAD_REQUEST,
                None,
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#
            ),
            IdentityError::InvalidCredentials {
                remaining_attempts: None
            }
        );
        assert_eq!(
            map_error(
                StatusCode::BAD_REQUEST,
                None,
                r#"{"code":400,"error_code":"email_not_confirmed","msg":"Email not confirmed"}"#
            ),
            IdentityError::EmailNotVerified
        );
        assert_eq!(
            map_error(StatusCode::TOO_MANY_REQUESTS, Some(120), "{}"),
            IdentityError::Locked {
                retry_after: Duration::from_secs(120)
            }
        );
        assert!(matches!(
            map_error(StatusCode::BAD_GATEWAY, None, "<html>"),
            IdentityError::Unavailable(_)
        ));
        assert!(matches!(
            map_error(StatusCode::UNAUTHORIZED, None, "not json"),
            IdentityError::Rejected(_)
        ));
    }

    #[test]
    fn test_requires_url() {
        let err = RemoteIdentityProvider::new(&IdentityConfig::default()).err();
        assert!(matches!(err, Some(IdentityError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_password_sign_in_without_factor() {
        let provider = provider_for(fake_gotrue(false)).await;

        let outcome = provider
            .sign_in("ada@example.com", "correct horse 1")
            .await
            .unwrap();
        let SignInOutcome::Authenticated(tokens) = outcome else {
            panic!("expected a session");
        };
        assert_eq!(tokens.access_token, "aal1-token");
        assert_eq!(tokens.user.name.as_deref(), Some("Ada"));
        assert!(tokens.user.email_verified);

        let err = provider.sign_in("ada@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials { .. }));
    }

    #[tokio::test]
    async fn test_factor_challenge_flow() {
        let provider = provider_for(fake_gotrue(true)).await;

        let SignInOutcome::MfaRequired(pending) = provider
            .sign_in("ada@example.com", "correct horse 1")
            .await
            .unwrap()
        else {
            panic!("expected a challenge");
        };
        assert_eq!(pending.method, MfaMethod::Totp);
        assert_ne!(pending.temp_token, "aal1-token");

        let err = provider
            .verify_mfa(&pending.temp_token, MfaMethod::Totp, "000000", false)
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::InvalidCode);

        let verified = provider
            .verify_mfa(&pending.temp_token, MfaMethod::Totp, "123456", false)
            .await
            .unwrap();
        assert_eq!(verified.tokens.access_token, "aal2-token");

        let err = provider
            .verify_mfa(&pending.temp_token, MfaMethod::Totp, "123456", false)
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::ChallengeExpired);
    }

    #[tokio::test]
    async fn test_abandoned_challenge_is_evicted() {
        let provider = provider_with_ttl(fake_gotrue(true), 1).await;

        for _ in 0..3 {
            let outcome = provider
                .sign_in("ada@example.com", "correct horse 1")
                .await
                .unwrap();
            assert!(matches!(outcome, SignInOutcome::MfaRequired(_)));
        }
        provider.pending.run_pending_tasks().await;
        assert_eq!(provider.pending.entry_count(), 3);

        let SignInOutcome::MfaRequired(pending) = provider
            .sign_in("ada@example.com", "correct horse 1")
            .await
            .unwrap()
        else {
            panic!("expected a challenge");
        };

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        provider.pending.run_pending_tasks().await;
        assert_eq!(provider.pending.entry_count(), 0);

        let err = provider
            .verify_mfa(&pending.temp_token, MfaMethod::Totp, "123456", false)
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::ChallengeExpired);
    }

    #[tokio::test]
    async fn test_get_user_and_refresh() {
        let provider = provider_for(fake_gotrue(false)).await;

        let identity = provider.get_user("aal2-token").await.unwrap();
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.app_metadata["provider"], "email");

        let err = provider.get_user("forged").await.unwrap_err();
        assert!(matches!(err, IdentityError::Rejected(_)));

        let tokens = provider.refresh(None, Some("refresh-1")).await.unwrap();
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-2"));
        let err = provider.refresh(None, Some("stale")).await.unwrap_err();
        assert!(matches!(err, IdentityError::Rejected(_)));

        provider.sign_out("aal2-token").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let config = IdentityConfig {
            url: Some("http://127.0.0.1:9".to_string()),
            request_timeout_secs: 2,
            ..Default::default()
        };
        let provider = RemoteIdentityProvider::new(&config).unwrap();
        let err = provider.get_user("token").await.unwrap_err();
        assert!(matches!(err, IdentityError::Unavailable(_)));
    }

    #[tokio::test]
    #[ignore = "requires a live GoTrue instance (IDENTITY_URL, IDENTITY_API_KEY)"]
    async fn test_live_sign_in() {
        let config = tollgate_core::AppConfig::from_env().unwrap().identity;
        let provider = RemoteIdentityProvider::new(&config).unwrap();
        let email = std::env::var("IDENTITY_TEST_EMAIL").unwrap();
        let password = std::env::var("IDENTITY_TEST_PASSWORD").unwrap();
        provider.sign_in(&email, &password).await.unwrap();
    }
}
