//! Lock store backed by `sled`
//!
//! A sled database is held exclusively by one process, so this store only
//! deduplicates between handlers inside that process (each holding a clone).
//! Separate server processes need [`RedisLockStore`](crate::persistence::RedisLockStore).
//!
//! Each entry's value is its expiry instant in milliseconds since the Unix
//! epoch, stored big-endian. An entry whose expiry has passed counts as
//! absent and may be taken over; the take-over goes through sled's
//! compare-and-swap so concurrent acquirers see exactly one winner.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sled::{Db, IVec, Tree};
use tracing::debug;

use crate::persistence::LockStore;
use crate::utils::error::LockError;

const LOCK_TREE: &str = "downlink_locks";

#[derive(Clone)]
pub struct SledLockStore {
    db: Db,
}

impl SledLockStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self, LockError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Share an already opened database.
    pub fn from_db(db: Db) -> Self {
        Self { db }
    }

    fn purge(tree: &Tree) -> Result<usize, sled::Error> {
        let now = Utc::now().timestamp_millis();

        let expired: Vec<(IVec, IVec)> = tree
            .iter()
            .filter_map(|res| res.ok())
            .filter(|(_, value)| expiry_of(value) <= now)
            .collect();

        let mut removed = 0;
        for (key, value) in expired {
            // entry may have been re-acquired since the scan
            if tree
                .compare_and_swap(key, Some(value), None as Option<&[u8]>)?
                .is_ok()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn acquire(tree: &Tree, key: &str, ttl: Duration) -> Result<bool, sled::Error> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        loop {
            let now = Utc::now().timestamp_millis();
            let current = tree.get(key)?;

            if let Some(value) = &current {
                if expiry_of(value) > now {
                    return Ok(false);
                }
            }

            let expiry = now.saturating_add(ttl_ms).to_be_bytes();
            match tree.compare_and_swap(key, current, Some(&expiry[..]))? {
                Ok(()) => return Ok(true),
                // lost the race, look again
                Err(_) => continue,
            }
        }
    }
}

#[async_trait]
impl LockStore for SledLockStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let db = self.db.clone();
        let key = key.to_owned();

        let acquired = tokio::task::spawn_blocking(move || {
            let tree = db.open_tree(LOCK_TREE)?;
            Self::acquire(&tree, &key, ttl)
        })
        .await??;

        Ok(acquired)
    }

    async fn purge_expired(&self) -> Result<usize, LockError> {
        let db = self.db.clone();

        let removed = tokio::task::spawn_blocking(move || {
            let tree = db.open_tree(LOCK_TREE)?;
            Self::purge(&tree)
        })
        .await??;

        if removed > 0 {
            debug!(removed, "purged expired downlink locks");
        }
        Ok(removed)
    }
}

/// Malformed values are treated as already expired.
fn expiry_of(value: &[u8]) -> i64 {
    <[u8; 8]>::try_from(value)
        .map(i64::from_be_bytes)
        .unwrap_or(i64::MIN)
}

impl std::fmt::Debug for SledLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledLockStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
