//! The `handler` module bridges the network-server core and applications on
//! the broker.
//!
//! - `engine`: the [`Handler`] itself, owning the session, the downlink queue
//!   and the inbound task tracking.
//! - `topic`: building and parsing per-device topics.
//! - `lock`: the short-lived lock that lets exactly one instance forward a
//!   downlink command all instances received.

pub mod engine;
pub mod lock;
pub mod topic;

pub use engine::Handler;
pub use lock::{DOWNLINK_LOCK_TTL, DownlinkLock, LockOutcome};
pub use topic::{TX_TOPIC, TopicAddress, TopicKind};
