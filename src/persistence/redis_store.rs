//! Lock store backed by Redis
//!
//! Every lock attempt checks a connection out of the pool, runs one
//! `SET key lock PX <ttl> NX` and gives the connection back. Redis expires
//! the entries itself. This is the store to use when handlers run in
//! separate processes or on separate hosts.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

use crate::persistence::LockStore;
use crate::utils::error::LockError;

#[derive(Clone)]
pub struct RedisLockStore {
    pool: Pool,
}

impl RedisLockStore {
    /// Build a pool for `url` (e.g. `redis://localhost:6379`) and check the
    /// server answers.
    pub async fn connect(url: &str) -> Result<Self, LockError> {
        let pool = Config::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        let store = Self { pool };
        store.ping().await?;
        info!(url = %url, "connected to redis lock store");
        Ok(store)
    }

    pub async fn ping(&self) -> Result<(), LockError> {
        let mut conn = self.pool.get().await?;
        let _: String = cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.pool.get().await?;

        // nil reply when the key already exists
        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg("lock")
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }
}

impl std::fmt::Debug for RedisLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockStore")
            .field("pool", &self.pool.status())
            .finish()
    }
}
