//! Redis-backed counter store shared by every API instance

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::info;

use super::store::{CounterStore, CounterStoreError};

/// Sorted-set log per key, updated in one MULTI/EXEC transaction
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, CounterStoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis counter store");
        Ok(Self { conn })
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn record(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        member: &str,
    ) -> Result<u64, CounterStoreError> {
        let floor = now_ms.saturating_sub(window_ms);
        let mut conn = self.conn.clone();

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(key, "-inf", format!("({floor}"))
            .ignore()
            .zadd(key, member, now_ms)
            .ignore()
            .zcard(key)
            .pexpire(key, window_ms as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }
}
