//! Tollgate API - authentication server and request authorization
//!
//! Serves the sign-in, second-factor, refresh, logout and registration
//! endpoints, and provides [`middleware::RouteGuard`] for protecting any other
//! axum route with rate limiting, token validation and permission checks.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod openapi;
pub mod rate_limit;
pub mod routes;
pub mod state;

#[cfg(feature = "test-utils")]
pub mod testing;

use axum::{http::HeaderValue, routing::get, Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;

use crate::state::AppState;

#[cfg(feature = "test-utils")]
pub use testing::{create_router_for_testing, TestFixture};

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the complete application router
pub fn create_router(state: AppState) -> Router {
    create_router_with(state, Router::new())
}

/// Build the application router with extra application routes
///
/// `routes` are merged before the outer layers, so they share panic
/// recovery, tracing and CORS with the auth endpoints. Protect them with
/// [`middleware::RouteGuard::apply`] first.
pub fn create_router_with(state: AppState, routes: Router<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/auth", routes::auth_routes(&state))
        .merge(routes)
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
