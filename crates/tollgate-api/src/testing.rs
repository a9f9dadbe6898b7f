//! Seeded in-process server for integration tests
//!
//! Everything runs in memory: the local identity provider with cheap
//! password hashing, a recording delivery channel, an in-memory role
//! repository, and an in-memory counter store unless one is supplied.

use axum::Router;
use std::sync::Arc;
use tollgate_core::{AppConfig, Permission, RoleId};

use crate::auth::{MemoryRoleRepository, PasswordConfig};
use crate::identity::{LocalIdentityProvider, RecordingDelivery};
use crate::rate_limit::{CounterStore, MemoryCounterStore, SlidingWindowLimiter};
use crate::state::AppState;

pub const TEST_PASSWORD: &str = "correct horse 1";
pub const VIEWER_EMAIL: &str = "viewer@example.com";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const MFA_EMAIL: &str = "mfa@example.com";
pub const UNVERIFIED_EMAIL: &str = "unverified@example.com";

pub struct TestFixture {
    pub state: AppState,
    pub identity: Arc<LocalIdentityProvider>,
    pub delivery: Arc<RecordingDelivery>,
    pub viewer_id: String,
    pub admin_id: String,
    pub mfa_user_id: String,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::build(AppConfig::default(), Arc::new(MemoryCounterStore::new()))
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::build(config, Arc::new(MemoryCounterStore::new()))
    }

    pub fn with_counter_store(store: Arc<dyn CounterStore>) -> Self {
        Self::build(AppConfig::default(), store)
    }

    /// Seed users:
    /// viewer (`viewer` role: VIEW_PROJECTS),
    /// admin (`admin` role: VIEW_PROJECTS, MANAGE_USERS),
    /// mfa (viewer with a TOTP factor and backup codes),
    /// unverified (no roles, email not confirmed)
    pub fn build(config: AppConfig, store: Arc<dyn CounterStore>) -> Self {
        let delivery = Arc::new(RecordingDelivery::new());
        let identity = Arc::new(
            LocalIdentityProvider::new(&config.identity)
                .with_password_config(PasswordConfig::lightweight())
                .with_delivery(delivery.clone()),
        );

        let seed = |email: &str, verified: bool| {
            identity
                .seed_user(email, TEST_PASSWORD, None, verified)
                .expect("seed user")
        };
        let viewer_id = seed(VIEWER_EMAIL, true);
        let admin_id = seed(ADMIN_EMAIL, true);
        let mfa_user_id = seed(MFA_EMAIL, true);
        seed(UNVERIFIED_EMAIL, false);
        identity.enroll_totp(&mfa_user_id).expect("enroll totp");

        let role = |raw: &str| RoleId::parse(raw).expect("role id");
        let perm = |raw: &str| Permission::parse(raw).expect("permission");
        let roles = MemoryRoleRepository::new()
            .with_role(role("viewer"), [perm("VIEW_PROJECTS")])
            .with_role(role("admin"), [perm("VIEW_PROJECTS"), perm("MANAGE_USERS")])
            .assign(viewer_id.clone(), role("viewer"))
            .assign(admin_id.clone(), role("admin"))
            .assign(mfa_user_id.clone(), role("viewer"));

        let state = AppState::new(
            config,
            identity.clone(),
            Arc::new(roles),
            Arc::new(SlidingWindowLimiter::new(store)),
        );

        Self {
            state,
            identity,
            delivery,
            viewer_id,
            admin_id,
            mfa_user_id,
        }
    }

    pub fn router(&self) -> Router {
        crate::create_router(self.state.clone())
    }

    /// Current code of the seeded TOTP factor
    pub fn totp_code(&self) -> String {
        self.identity
            .current_totp_code(&self.mfa_user_id)
            .expect("mfa user has a TOTP factor")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Router over a freshly seeded [`TestFixture`]
pub fn create_router_for_testing() -> Router {
    TestFixture::new().router()
}
