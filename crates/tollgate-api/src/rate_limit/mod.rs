//! Sliding-window rate limiting
//!
//! Each caller key owns a log of request timestamps. A request is limited
//! when, after recording it, the log holds more than `max` entries inside the
//! window. The log lives in a [`CounterStore`]: Redis when several API
//! instances share limits, memory otherwise.
//!
//! Store failures never block traffic. The limiter logs the failure and lets
//! the request through.

pub mod redis_store;
pub mod store;

pub use redis_store::RedisCounterStore;
pub use store::{CounterStore, CounterStoreError, MemoryCounterStore};

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tollgate_core::RateLimitConfig;
use tracing::{debug, warn};

use crate::audit::extract_ip_address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOptions {
    pub window: Duration,
    pub max: u32,
}

impl RateLimitOptions {
    pub fn new(window: Duration, max: u32) -> Self {
        Self { window, max }
    }

    /// General API limit
    pub fn general(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_millis(config.window_ms), config.max)
    }

    /// Stricter limit for credential endpoints
    pub fn auth(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_millis(config.auth_window_ms), config.auth_max)
    }

    fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limited: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which the current window ends
    pub reset_at_ms: u64,
}

impl RateLimitDecision {
    fn allow_all(options: &RateLimitOptions, now_ms: u64) -> Self {
        Self {
            limited: false,
            limit: options.max,
            remaining: options.max,
            reset_at_ms: now_ms + options.window_ms(),
        }
    }

    pub fn reset_epoch_secs(&self) -> u64 {
        self.reset_at_ms / 1000
    }

    /// Seconds until the window ends, at least one
    pub fn retry_after(&self, now_ms: u64) -> Duration {
        let secs = self.reset_at_ms.saturating_sub(now_ms).div_ceil(1000).max(1);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u32,
    /// Epoch seconds
    pub reset: u64,
}

/// Header values for a request arriving at `now_ms`; touches no store
pub fn get_headers(options: &RateLimitOptions, now_ms: u64) -> RateLimitHeaders {
    RateLimitHeaders {
        limit: options.max,
        reset: (now_ms + options.window_ms()) / 1000,
    }
}

/// Limiter seam injected into the route guard
#[async_trait]
pub trait RateLimitChecker: Send + Sync {
    async fn check(&self, key: &str, options: RateLimitOptions) -> RateLimitDecision;
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Counter key for a request: `prefix:scope:client-ip`
pub fn client_key(prefix: &str, scope: &str, headers: &HeaderMap) -> String {
    let ip = extract_ip_address(headers).unwrap_or_else(|| "anonymous".to_string());
    format!("{prefix}:{scope}:{ip}")
}

pub struct SlidingWindowLimiter {
    store: Arc<dyn CounterStore>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCounterStore::new()))
    }

    /// Check against an explicit clock reading
    pub async fn check_at(
        &self,
        key: &str,
        options: RateLimitOptions,
        now_ms: u64,
    ) -> RateLimitDecision {
        let member = format!("{now_ms}-{}", uuid::Uuid::new_v4());
        let window_ms = options.window_ms();

        match self.store.record(key, now_ms, window_ms, &member).await {
            Ok(count) => {
                let limited = count > u64::from(options.max);
                let remaining = u64::from(options.max).saturating_sub(count) as u32;
                if limited {
                    debug!(key = %key, count, max = options.max, "Rate limit exceeded");
                }
                RateLimitDecision {
                    limited,
                    limit: options.max,
                    remaining,
                    reset_at_ms: now_ms + window_ms,
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Rate limit store unavailable, allowing request");
                RateLimitDecision::allow_all(&options, now_ms)
            }
        }
    }
}

#[async_trait]
impl RateLimitChecker for SlidingWindowLimiter {
    async fn check(&self, key: &str, options: RateLimitOptions) -> RateLimitDecision {
        self.check_at(key, options, now_ms()).await
    }
}
