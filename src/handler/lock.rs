use std::sync::Arc;
use std::time::Duration;

use tracing::{error, trace};

use crate::persistence::LockStore;

/// How long a downlink lock lives. Covers near-simultaneous fan-out delivery
/// to sibling instances without suppressing a later retransmission.
pub const DOWNLINK_LOCK_TTL: Duration = Duration::from_millis(100);

const LOCK_KEY_PREFIX: &str = "lora:as:downlink:lock";

/// Result of a lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// This instance owns the delivery.
    Acquired,
    /// Another instance got there first; drop silently.
    AlreadyHeld,
    /// Lock state is unknown; drop.
    StoreError,
}

/// Picks a single winner among the instances that received the same
/// downlink command.
#[derive(Clone)]
pub struct DownlinkLock {
    store: Arc<dyn LockStore>,
    ttl: Duration,
}

impl DownlinkLock {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self::with_ttl(store, DOWNLINK_LOCK_TTL)
    }

    pub fn with_ttl(store: Arc<dyn LockStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(dev_eui: &str, reference: &str) -> String {
        format!("{LOCK_KEY_PREFIX}:{dev_eui}:{reference}")
    }

    pub async fn try_acquire(&self, dev_eui: &str, reference: &str) -> LockOutcome {
        let key = Self::key(dev_eui, reference);
        match self.store.set_if_absent(&key, self.ttl).await {
            Ok(true) => LockOutcome::Acquired,
            Ok(false) => {
                trace!(key = %key, "downlink already handled by another instance");
                LockOutcome::AlreadyHeld
            }
            Err(e) => {
                error!(key = %key, error = %e, "acquire downlink payload lock error");
                LockOutcome::StoreError
            }
        }
    }
}

impl std::fmt::Debug for DownlinkLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownlinkLock")
            .field("store", &"dyn LockStore")
            .field("ttl", &self.ttl)
            .finish()
    }
}
