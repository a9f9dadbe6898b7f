//! API integration tests
//!
//! Every test drives a freshly seeded in-memory server through
//! `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tollgate_api::auth::{Claims, MemoryRoleRepository};
use tollgate_api::identity::{
    DeliveryKind, IdentityError, IdentityProvider, IssuedTokens, MfaVerified, SignInOutcome,
};
use tollgate_api::middleware::{AuthContext, RouteGuard};
use tollgate_api::rate_limit::{
    CounterStore, CounterStoreError, RateLimitOptions, SlidingWindowLimiter,
};
use tollgate_api::state::AppState;
use tollgate_api::testing::{
    TestFixture, MFA_EMAIL, TEST_PASSWORD, UNVERIFIED_EMAIL, VIEWER_EMAIL,
};
use tollgate_api::create_router_for_testing;
use tollgate_core::config::DEV_JWT_SECRET;
use tollgate_core::{AppConfig, Environment, Identity, MfaMethod, Permission, UserProfile};
use tower::ServiceExt;

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn authed_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let mut request = create_json_request(method, uri, body);
    request
        .headers_mut()
        .insert("Authorization", format!("Bearer {token}").parse().unwrap());
    request
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn login(app: &Router, email: &str, password: &str) -> Response {
    app.clone()
        .oneshot(create_json_request(
            "POST",
            "/api/auth/login",
            Some(json!({ "email": email, "password": password })),
        ))
        .await
        .unwrap()
}

async fn login_token(app: &Router, email: &str) -> String {
    let response = login(app, email, TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"].as_str().unwrap().to_string()
}

/// Router with one protected route that counts its invocations
fn projects_router(state: AppState, permission: &str) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler = move |context: AuthContext| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            context.user_id
        }
    };

    let projects = RouteGuard::authenticated()
        .require_permission(Permission::parse(permission).unwrap())
        .apply(Router::new().route("/api/projects", get(handler)), state.clone());

    let app = tollgate_api::create_router_with(state, projects);
    (app, calls)
}

fn expired_token() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let claims = Claims {
        iss: "tollgate".to_string(),
        sub: "someone".to_string(),
        jti: "jti-1".to_string(),
        sid: "sid-1".to_string(),
        iat: now - 7200,
        exp: now - 3600,
        email: VIEWER_EMAIL.to_string(),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(DEV_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["paths"]["/api/auth/login"].is_object());
}

// =============================================================================
// Login Tests
// =============================================================================

#[tokio::test]
async fn test_login_without_mfa() {
    let app = create_router_for_testing();

    let response = login(&app, VIEWER_EMAIL, TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-limit"));
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let json = body_json(response).await;
    assert_eq!(json["requiresMfa"], false);
    assert_eq!(json["user"]["email"], VIEWER_EMAIL);
    assert_eq!(json["user"]["permissions"], json!(["VIEW_PROJECTS"]));
    assert!(json["token"].as_str().unwrap().len() > 20);
    assert!(json["refreshToken"].is_string());
    assert!(json["expiresAt"].is_i64());
}

#[tokio::test]
async fn test_login_wrong_password_reports_remaining_attempts() {
    let app = create_router_for_testing();

    let response = login(&app, VIEWER_EMAIL, "wrong password 1").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "4");

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "auth/invalid-credentials");
}

#[tokio::test]
async fn test_login_validates_body() {
    let app = create_router_for_testing();

    let response = login(&app, "not-an-email", TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "request/invalid");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_account_lockout_returns_retry_after() {
    let app = create_router_for_testing();

    for _ in 0..4 {
        let response = login(&app, VIEWER_EMAIL, "wrong password 1").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = login(&app, VIEWER_EMAIL, "wrong password 1").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "900");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(body_json(response).await["error"]["code"], "rate-limit/exceeded");

    // The right password does not get through while locked
    let response = login(&app, VIEWER_EMAIL, TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_unverified_email_is_refused() {
    let app = create_router_for_testing();

    let response = login(&app, UNVERIFIED_EMAIL, TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "auth/email-not-verified");
}

// =============================================================================
// Rate Limit Tests
// =============================================================================

#[tokio::test]
async fn test_auth_rate_limit_blocks_max_plus_one() {
    let mut config = AppConfig::default();
    config.rate_limit.auth_max = 3;
    let app = TestFixture::with_config(config).router();

    for _ in 0..3 {
        let response = login(&app, VIEWER_EMAIL, TEST_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = login(&app, VIEWER_EMAIL, TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(response.headers()["x-ratelimit-limit"], "3");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(body_json(response).await["error"]["code"], "rate-limit/exceeded");
}

#[tokio::test]
async fn test_rate_limit_is_per_client_ip() {
    let mut config = AppConfig::default();
    config.rate_limit.auth_max = 1;
    let app = TestFixture::with_config(config).router();

    let from = |ip: &str| {
        let mut request = create_json_request(
            "POST",
            "/api/auth/login",
            Some(json!({ "email": VIEWER_EMAIL, "password": TEST_PASSWORD })),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        request
    };

    let first = app.clone().oneshot(from("203.0.113.1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let blocked = app.clone().oneshot(from("203.0.113.1")).await.unwrap();
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
    let other = app.oneshot(from("203.0.113.2")).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

struct UnreachableStore;

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn record(&self, _: &str, _: u64, _: u64, _: &str) -> Result<u64, CounterStoreError> {
        Err(CounterStoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_rate_limiter_fails_open() {
    let app = TestFixture::with_counter_store(Arc::new(UnreachableStore)).router();

    for _ in 0..15 {
        let response = login(&app, VIEWER_EMAIL, TEST_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// =============================================================================
// Protected Route Tests
// =============================================================================

#[tokio::test]
async fn test_me_requires_token() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request("GET", "/api/auth/me", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "auth/missing-token");
}

#[tokio::test]
async fn test_me_returns_caller_profile() {
    let app = create_router_for_testing();
    let token = login_token(&app, VIEWER_EMAIL).await;

    let response = app
        .oneshot(authed_request("GET", "/api/auth/me", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["email"], VIEWER_EMAIL);
    assert_eq!(json["roles"], json!(["viewer"]));
}

#[tokio::test]
async fn test_expired_token_is_unauthorized_and_handler_not_invoked() {
    let fixture = TestFixture::new();
    let (app, calls) = projects_router(fixture.state.clone(), "VIEW_PROJECTS");

    let response = app
        .oneshot(authed_request("GET", "/api/projects", &expired_token(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "auth/unauthorized");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_permission_is_forbidden_and_handler_not_invoked() {
    let fixture = TestFixture::new();
    fixture
        .identity
        .seed_user("norole@example.com", TEST_PASSWORD, None, true)
        .unwrap();
    let (app, calls) = projects_router(fixture.state.clone(), "VIEW_PROJECTS");
    let token = login_token(&app, "norole@example.com").await;

    let response = app
        .oneshot(authed_request("GET", "/api/projects", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "auth/forbidden");
    assert_eq!(json["error"]["details"], "Missing permission: VIEW_PROJECTS");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_forbidden_hides_permission_in_production() {
    let mut config = AppConfig::default();
    config.environment = Environment::Production;
    let fixture = TestFixture::with_config(config);
    let (app, _calls) = projects_router(fixture.state.clone(), "MANAGE_USERS");
    let token = login_token(&app, VIEWER_EMAIL).await;

    let response = app
        .oneshot(authed_request("GET", "/api/projects", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert!(json["error"].get("details").is_none());
    assert!(!json["error"]["message"].as_str().unwrap().contains("MANAGE_USERS"));
}

#[tokio::test]
async fn test_permitted_caller_reaches_handler() {
    let fixture = TestFixture::new();
    let (app, calls) = projects_router(fixture.state.clone(), "VIEW_PROJECTS");
    let token = login_token(&app, VIEWER_EMAIL).await;

    let response = app
        .oneshot(authed_request("GET", "/api/projects", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, fixture.viewer_id.as_bytes());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Accepts no credentials and cannot be reached for validation
struct OfflineIdentity;

#[async_trait]
impl IdentityProvider for OfflineIdentity {
    async fn sign_in(&self, _: &str, _: &str) -> Result<SignInOutcome, IdentityError> {
        Err(IdentityError::Unavailable("connection refused".to_string()))
    }
    async fn verify_mfa(
        &self,
        _: &str,
        _: MfaMethod,
        _: &str,
        _: bool,
    ) -> Result<MfaVerified, IdentityError> {
        Err(IdentityError::Unavailable("connection refused".to_string()))
    }
    async fn refresh(&self, _: Option<&str>, _: Option<&str>) -> Result<IssuedTokens, IdentityError> {
        Err(IdentityError::Unavailable("connection refused".to_string()))
    }
    async fn sign_out(&self, _: &str) -> Result<(), IdentityError> {
        Err(IdentityError::Unavailable("connection refused".to_string()))
    }
    async fn sign_up(&self, _: &str, _: &str, _: Option<&str>) -> Result<UserProfile, IdentityError> {
        Err(IdentityError::Unavailable("connection refused".to_string()))
    }
    async fn confirm_email(&self, _: &str) -> Result<(), IdentityError> {
        Err(IdentityError::Unavailable("connection refused".to_string()))
    }
    async fn resend_verification(&self, _: &str) -> Result<(), IdentityError> {
        Err(IdentityError::Unavailable("connection refused".to_string()))
    }
    async fn get_user(&self, _: &str) -> Result<Identity, IdentityError> {
        Err(IdentityError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_validator_outage_is_internal_error() {
    let state = AppState::new(
        AppConfig::default(),
        Arc::new(OfflineIdentity),
        Arc::new(MemoryRoleRepository::new()),
        Arc::new(SlidingWindowLimiter::in_memory()),
    );
    let app = tollgate_api::create_router(state);

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/auth/me", "any-token", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"]["code"], "server/internal-error");

    // A missing credential is still a 401, never a 500
    let response = app
        .clone()
        .oneshot(create_json_request("GET", "/api/auth/me", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Logout stays best effort
    let response = app
        .oneshot(authed_request("POST", "/api/auth/logout", "any-token", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_route_guard_rate_limit_without_authentication() {
    let fixture = TestFixture::new();
    let limited = RouteGuard::public()
        .rate_limit("ping", RateLimitOptions::new(Duration::from_secs(60), 1))
        .apply(Router::new().route("/ping", get(|| async { "pong" })), fixture.state.clone())
        .with_state(fixture.state.clone());

    let first = limited
        .clone()
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-remaining"], "0");

    let second = limited
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

async fn build_report(_context: AuthContext) -> &'static str {
    panic!("report builder crashed")
}

#[tokio::test]
async fn test_panicking_handler_returns_internal_envelope() {
    let fixture = TestFixture::new();
    let reports = RouteGuard::authenticated().apply(
        Router::new().route("/api/reports", get(build_report)),
        fixture.state.clone(),
    );
    let app = tollgate_api::create_router_with(fixture.state.clone(), reports);
    let token = login_token(&app, VIEWER_EMAIL).await;

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/reports", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "server/internal-error");
    assert_eq!(json["error"]["message"], "Internal server error");
    assert!(!json.to_string().contains("report builder crashed"));

    // The guard still runs first, and the server keeps serving
    let response = app
        .clone()
        .oneshot(create_json_request("GET", "/api/reports", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// MFA Tests
// =============================================================================

#[tokio::test]
async fn test_mfa_login_then_verify() {
    let fixture = TestFixture::new();
    let app = fixture.router();

    let response = login(&app, MFA_EMAIL, TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["requiresMfa"], true);
    assert_eq!(json["mfaMethod"], "totp");
    assert!(json.get("refreshToken").is_none());
    let temp_token = json["token"].as_str().unwrap().to_string();

    // The challenge token is not a session
    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/auth/me", &temp_token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/auth/2fa/verify",
            &temp_token,
            Some(json!({ "method": "totp", "code": "000000" })),
        ))
        .await
        .unwrap();
    // A wrong guess that happens to match is astronomically unlikely
    if response.status() != StatusCode::OK {
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "auth/mfa-invalid-code");
    }

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/auth/2fa/verify",
            &temp_token,
            Some(json!({ "method": "totp", "code": fixture.totp_code() })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user"]["permissions"], json!(["VIEW_PROJECTS"]));
    let token = json["token"].as_str().unwrap().to_string();

    let response = app
        .oneshot(authed_request("GET", "/api/auth/me", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_mfa_verify_without_challenge_token() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request(
            "POST",
            "/api/auth/2fa/verify",
            Some(json!({ "method": "totp", "code": "123456" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "auth/missing-token");
}

// =============================================================================
// Refresh and Logout Tests
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_session_tokens() {
    let app = create_router_for_testing();
    let response = login(&app, VIEWER_EMAIL, TEST_PASSWORD).await;
    let json = body_json(response).await;
    let token = json["token"].as_str().unwrap().to_string();
    let refresh_token = json["refreshToken"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/auth/refresh",
            &token,
            Some(json!({ "refreshToken": refresh_token })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let new_token = json["token"].as_str().unwrap().to_string();
    assert_ne!(new_token, token);

    let old = app
        .clone()
        .oneshot(authed_request("GET", "/api/auth/me", &token, None))
        .await
        .unwrap();
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = app
        .oneshot(authed_request("GET", "/api/auth/me", &new_token, None))
        .await
        .unwrap();
    assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_credentials() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request("POST", "/api/auth/refresh", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "auth/missing-token");
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let app = create_router_for_testing();
    let token = login_token(&app, VIEWER_EMAIL).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(authed_request("POST", "/api/auth/logout", &token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(authed_request("GET", "/api/auth/me", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Registration Tests
// =============================================================================

#[tokio::test]
async fn test_register_verify_then_login() {
    let fixture = TestFixture::new();
    let app = fixture.router();
    let email = "newcomer@example.com";

    let response = app
        .clone()
        .oneshot(create_json_request(
            "POST",
            "/api/auth/register",
            Some(json!({ "email": email, "password": TEST_PASSWORD, "name": "New Comer" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["user"]["email"], email);
    assert!(json.get("token").is_none());

    let response = login(&app, email, TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let token = fixture
        .delivery
        .last_secret(email, DeliveryKind::EmailVerification)
        .expect("verification token delivered");
    let response = app
        .clone()
        .oneshot(create_json_request(
            "POST",
            "/api/auth/verify-email",
            Some(json!({ "token": token })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(&app, email, TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request(
            "POST",
            "/api/auth/register",
            Some(json!({ "email": VIEWER_EMAIL, "password": TEST_PASSWORD })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "request/invalid");
}

#[tokio::test]
async fn test_verify_email_with_bad_token() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request(
            "POST",
            "/api/auth/verify-email",
            Some(json!({ "token": "not-a-real-token" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resend_verification_never_reveals_accounts() {
    let fixture = TestFixture::new();
    let app = fixture.router();

    for email in ["nobody@example.com", VIEWER_EMAIL, UNVERIFIED_EMAIL] {
        let response = app
            .clone()
            .oneshot(create_json_request(
                "POST",
                "/api/auth/resend-verification",
                Some(json!({ "email": email })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert!(fixture
        .delivery
        .last_secret(UNVERIFIED_EMAIL, DeliveryKind::EmailVerification)
        .is_some());
    assert!(fixture
        .delivery
        .last_secret("nobody@example.com", DeliveryKind::EmailVerification)
        .is_none());
}
