//! The `persistence` module provides the shared key-value store used to
//! deduplicate downlink commands across handler instances.
//!
//! The handler only needs an atomic "set if absent, with expiry" operation,
//! expressed by the [`LockStore`] trait. Two implementations exist:
//! - [`RedisLockStore`]: networked, shared by every server process pointed at
//!   the same Redis.
//! - [`SledLockStore`]: embedded, shared only by the handlers of one process.

pub mod redis_store;
pub mod sled_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{LockBackend, LockSettings};
use crate::utils::error::LockError;

pub use redis_store::RedisLockStore;
pub use sled_store::SledLockStore;

/// Atomic conditional set with expiry.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create `key` with the given time-to-live unless a live entry exists.
    ///
    /// Returns `true` when this call created the entry.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Drop entries whose time-to-live has passed. Returns how many were removed.
    ///
    /// Stores that expire entries on their own have nothing to do.
    async fn purge_expired(&self) -> Result<usize, LockError> {
        Ok(0)
    }
}

/// Open the store selected by `settings.backend`.
pub async fn open_lock_store(settings: &LockSettings) -> Result<Arc<dyn LockStore>, LockError> {
    match settings.backend {
        LockBackend::Redis => Ok(Arc::new(RedisLockStore::connect(&settings.redis_url).await?)),
        LockBackend::Sled => Ok(Arc::new(SledLockStore::open(&settings.path)?)),
    }
}

#[cfg(test)]
mod tests;
