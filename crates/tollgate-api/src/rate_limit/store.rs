//! Counter stores for the sliding-window log

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Shared timestamp log per key
///
/// `record` must, atomically per key: drop entries older than
/// `now_ms - window_ms`, add `member` at `now_ms`, count the entries, and let
/// the key expire after `window_ms`. It returns the count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn record(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        member: &str,
    ) -> Result<u64, CounterStoreError>;
}

/// Single-process store; the default when no Redis URL is configured
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    logs: Mutex<Logs>,
}

#[derive(Debug, Default)]
struct Logs {
    by_key: HashMap<String, KeyLog>,
    next_sweep_ms: u64,
}

#[derive(Debug, Default)]
struct KeyLog {
    hits: VecDeque<u64>,
    /// Last hit plus the window it was recorded with
    expires_at_ms: u64,
}

/// How often expired keys are dropped from the map
const SWEEP_INTERVAL_MS: u64 = 60_000;

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_count(&self) -> usize {
        self.logs.lock().map(|logs| logs.by_key.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn record(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        _member: &str,
    ) -> Result<u64, CounterStoreError> {
        let floor = now_ms.saturating_sub(window_ms);
        let mut logs = self
            .logs
            .lock()
            .map_err(|_| CounterStoreError::Unavailable("counter map poisoned".to_string()))?;

        // Each key expires on its own window, so short scopes never evict long ones
        if now_ms >= logs.next_sweep_ms {
            logs.by_key.retain(|_, log| log.expires_at_ms > now_ms);
            logs.next_sweep_ms = now_ms.saturating_add(SWEEP_INTERVAL_MS);
        }

        let log = logs.by_key.entry(key.to_string()).or_default();
        while log.hits.front().is_some_and(|oldest| *oldest < floor) {
            log.hits.pop_front();
        }
        log.hits.push_back(now_ms);
        log.expires_at_ms = log.expires_at_ms.max(now_ms.saturating_add(window_ms));
        Ok(log.hits.len() as u64)
    }
}
