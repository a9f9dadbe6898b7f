//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::auth;
use crate::middleware::RouteGuard;
use crate::rate_limit::RateLimitOptions;
use crate::state::AppState;

/// Routes mounted under `/api/auth`
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let limits = &state.config.rate_limit;

    // Credential checks share the strict limit
    let credential_routes = RouteGuard::public()
        .rate_limit("auth", RateLimitOptions::auth(limits))
        .apply(
            Router::new()
                .route("/login", post(auth::login_handler))
                .route("/2fa/verify", post(auth::verify_mfa_handler))
                .route("/register", post(auth::register_handler))
                .route("/resend-verification", post(auth::resend_verification_handler)),
            state.clone(),
        );

    let session_routes = RouteGuard::public()
        .rate_limit("api", RateLimitOptions::general(limits))
        .apply(
            Router::new()
                .route("/refresh", post(auth::refresh_handler))
                .route("/logout", post(auth::logout_handler))
                .route("/verify-email", post(auth::verify_email_handler)),
            state.clone(),
        );

    let protected_routes = RouteGuard::authenticated()
        .rate_limit("api", RateLimitOptions::general(limits))
        .apply(Router::new().route("/me", get(auth::me_handler)), state.clone());

    Router::new()
        .merge(credential_routes)
        .merge(session_routes)
        .merge(protected_routes)
}
