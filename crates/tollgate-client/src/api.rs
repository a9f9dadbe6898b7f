//! Auth API client
//!
//! [`AuthApi`] is the seam between the session machine and the network.
//! [`HttpAuthApi`] talks to a Tollgate server over reqwest and turns every
//! non-2xx response into a typed [`AuthError`] right here, so nothing above
//! this module ever looks at a status code or an error envelope.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tollgate_core::wire::{
    ErrorEnvelope, LoginRequest, LoginResponse, MfaVerifyRequest, MfaVerifyResponse,
    RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
    ResendVerificationRequest, HEADER_RATE_LIMIT_REMAINING, HEADER_RETRY_AFTER,
};
use tollgate_core::{AuthError, ErrorCode, UserProfile};
use tracing::{debug, warn};

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, AuthError>;

    /// Complete a second-factor challenge using its temp token
    async fn verify_mfa(
        &self,
        temp_token: &str,
        request: &MfaVerifyRequest,
    ) -> Result<MfaVerifyResponse, AuthError>;

    async fn refresh(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<RefreshResponse, AuthError>;

    async fn logout(&self, access_token: &str) -> Result<(), AuthError>;

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, AuthError>;

    async fn resend_verification(&self, email: &str) -> Result<(), AuthError>;

    /// Profile behind an access token
    async fn current_user(&self, access_token: &str) -> Result<UserProfile, AuthError>;
}

/// reqwest-backed [`AuthApi`]
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AuthError> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "Auth server unreachable");
            AuthError::Internal(format!("Auth server unreachable: {e}"))
        })?;

        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AuthError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| AuthError::Internal(format!("Malformed auth server response: {e}")))
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, AuthError> {
        debug!(email = %request.email, "POST /api/auth/login");
        self.send_json(self.client.post(self.url("/api/auth/login")).json(request))
            .await
    }

    async fn verify_mfa(
        &self,
        temp_token: &str,
        request: &MfaVerifyRequest,
    ) -> Result<MfaVerifyResponse, AuthError> {
        debug!(method = %request.method, "POST /api/auth/2fa/verify");
        self.send_json(
            self.client
                .post(self.url("/api/auth/2fa/verify"))
                .bearer_auth(temp_token)
                .json(request),
        )
        .await
    }

    async fn refresh(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<RefreshResponse, AuthError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.map(str::to_string),
        };
        self.send_json(
            self.client
                .post(self.url("/api/auth/refresh"))
                .bearer_auth(access_token)
                .json(&body),
        )
        .await
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        self.send(
            self.client
                .post(self.url("/api/auth/logout"))
                .bearer_auth(access_token),
        )
        .await
        .map(|_| ())
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, AuthError> {
        self.send_json(self.client.post(self.url("/api/auth/register")).json(request))
            .await
    }

    async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let body = ResendVerificationRequest {
            email: email.to_string(),
        };
        self.send(
            self.client
                .post(self.url("/api/auth/resend-verification"))
                .json(&body),
        )
        .await
        .map(|_| ())
    }

    async fn current_user(&self, access_token: &str) -> Result<UserProfile, AuthError> {
        self.send_json(
            self.client
                .get(self.url("/api/auth/me"))
                .bearer_auth(access_token),
        )
        .await
    }
}

async fn error_from_response(response: Response) -> AuthError {
    let status = response.status();
    let retry_after = header_str(&response, HEADER_RETRY_AFTER);
    let remaining = header_str(&response, HEADER_RATE_LIMIT_REMAINING);
    let body = response.bytes().await.unwrap_or_default();
    parse_error(status, retry_after.as_deref(), remaining.as_deref(), &body)
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Build an [`AuthError`] from the parts of a failed response
///
/// The envelope code wins when it is recognised; otherwise the status decides.
/// `Retry-After` is read as delta-seconds.
pub fn parse_error(
    status: StatusCode,
    retry_after: Option<&str>,
    remaining: Option<&str>,
    body: &[u8],
) -> AuthError {
    let retry_after = retry_after
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let remaining = remaining.and_then(|v| v.trim().parse::<u32>().ok());

    let envelope = serde_json::from_slice::<ErrorEnvelope>(body).ok();
    let message = envelope
        .as_ref()
        .map(|e| e.error.message.clone())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

    let code = envelope
        .as_ref()
        .and_then(|e| ErrorCode::from_wire(&e.error.code))
        .unwrap_or_else(|| code_for_status(status));

    AuthError::from_wire(code, message, retry_after, remaining)
}

fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::UNAUTHORIZED => ErrorCode::InvalidToken,
        StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        StatusCode::TOO_MANY_REQUESTS => ErrorCode::RateLimitExceeded,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::BadRequest,
        StatusCode::CONFLICT => ErrorCode::Cancelled,
        _ => ErrorCode::InternalError,
    }
}
