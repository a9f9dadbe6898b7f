//! Generated OpenAPI document, served at `/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tollgate API",
        description = "Session authentication, MFA, and request authorization"
    ),
    paths(
        health::health_check,
        auth::login_handler,
        auth::verify_mfa_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::register_handler,
        auth::verify_email_handler,
        auth::resend_verification_handler,
        auth::me_handler,
    ),
    components(schemas(
        health::HealthResponse,
        tollgate_core::wire::LoginRequest,
        tollgate_core::wire::LoginResponse,
        tollgate_core::wire::MfaVerifyRequest,
        tollgate_core::wire::MfaVerifyResponse,
        tollgate_core::wire::RefreshRequest,
        tollgate_core::wire::RefreshResponse,
        tollgate_core::wire::RegisterRequest,
        tollgate_core::wire::RegisterResponse,
        tollgate_core::wire::VerifyEmailRequest,
        tollgate_core::wire::ResendVerificationRequest,
        tollgate_core::wire::MessageResponse,
        tollgate_core::wire::ErrorEnvelope,
        tollgate_core::wire::ErrorBody,
        tollgate_core::UserProfile,
        tollgate_core::MfaMethod,
        tollgate_core::Permission,
        tollgate_core::RoleId,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Sign-in, second factor, and session lifecycle"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
