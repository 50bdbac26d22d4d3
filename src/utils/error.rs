//! Error types for the `nodelink` crate.
//!
//! Each layer has its own enum: the transport, the lock store, the payload
//! codec and the handler itself. Only [`HandlerError`] is surfaced to the
//! network-server core; failures on the inbound path are logged and the
//! message is dropped.

use thiserror::Error;

/// Errors raised by a broker [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid broker address '{0}'")]
    InvalidAddress(String),

    #[error("connecting to broker error: {0}")]
    Connect(#[from] rumqttc::ConnectionError),

    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("subscription to {0} refused by broker")]
    SubscribeRefused(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("{0}")]
    Injected(String),

    #[error("transport session closed")]
    Closed,
}

/// Errors raised by a [`LockStore`](crate::persistence::LockStore).
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store error: {0}")]
    Store(#[from] sled::Error),

    #[error("lock store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("redis pool config error: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),
}

/// Errors raised while encoding or decoding payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{kind} payload marshal error: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload unmarshal error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Errors returned to callers of the [`Handler`](crate::handler::Handler).
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("connecting to broker error: {0}")]
    Connect(#[source] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("publish {kind} payload error: {source}")]
    Publish {
        kind: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("unsubscribe from {topic} error: {source}")]
    Unsubscribe {
        topic: String,
        #[source]
        source: TransportError,
    },
}
