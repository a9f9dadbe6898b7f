//! Application state shared across handlers and middleware

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Instant;
use tollgate_core::{AppConfig, IdentityProviderKind};
use tracing::{info, warn};

use crate::auth::{
    MemoryRoleRepository, PermissionResolver, PgRoleRepository, RoleRepository, TokenValidator,
};
use crate::identity::{IdentityProvider, LocalIdentityProvider, RemoteIdentityProvider};
use crate::rate_limit::{
    CounterStore, MemoryCounterStore, RateLimitChecker, RedisCounterStore, SlidingWindowLimiter,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityProvider>,
    pub validator: TokenValidator,
    pub permissions: PermissionResolver,
    pub limiter: Arc<dyn RateLimitChecker>,
    pub started_at: Instant,
}

impl AppState {
    /// Assemble state from already-built backends
    pub fn new(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        roles: Arc<dyn RoleRepository>,
        limiter: Arc<dyn RateLimitChecker>,
    ) -> Self {
        // Cached permissions never outlive the token they were resolved for
        let permission_ttl = config.identity.access_token_ttl();
        Self {
            validator: TokenValidator::new(identity.clone()),
            permissions: PermissionResolver::new(roles, permission_ttl),
            config: Arc::new(config),
            identity,
            limiter,
            started_at: Instant::now(),
        }
    }

    /// Connect every backend named in the configuration
    ///
    /// Redis and Postgres are optional. Without them the counter store and
    /// role repository live in memory, which is only correct for a single
    /// instance.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let identity: Arc<dyn IdentityProvider> = match config.identity.provider {
            IdentityProviderKind::Local => {
                info!("Using local identity provider");
                Arc::new(LocalIdentityProvider::new(&config.identity))
            }
            IdentityProviderKind::Remote => {
                info!(url = ?config.identity.url, "Using remote identity provider");
                Arc::new(RemoteIdentityProvider::new(&config.identity)?)
            }
        };

        let roles: Arc<dyn RoleRepository> = match &config.database.postgres_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database.postgres_pool_size)
                    .connect(url)
                    .await?;
                info!("Connected to Postgres role store");
                Arc::new(PgRoleRepository::new(pool))
            }
            None => {
                warn!("DATABASE_URL not set, using an empty in-memory role repository");
                Arc::new(MemoryRoleRepository::new())
            }
        };

        let store: Arc<dyn CounterStore> = match &config.database.redis_url {
            Some(url) => match RedisCounterStore::connect(url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, rate limits are per instance");
                    Arc::new(MemoryCounterStore::new())
                }
            },
            None => Arc::new(MemoryCounterStore::new()),
        };
        let limiter = Arc::new(SlidingWindowLimiter::new(store));

        Ok(Self::new(config, identity, roles, limiter))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
