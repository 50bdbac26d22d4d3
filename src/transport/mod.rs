//! The `transport` module is responsible for the broker session: publishing,
//! subscribing and reporting what happens on the connection.
//!
//! A [`Transport`] is the command side. The event side is a channel of
//! [`SessionEvent`]s handed out when the transport is created; the handler
//! consumes it and treats every received message as an independent unit of
//! work.

pub mod local;
pub mod mqtt;

use async_trait::async_trait;

use crate::utils::error::TransportError;

pub use local::LocalTransport;
pub use mqtt::MqttTransport;
pub use rumqttc::QoS;

/// Something that happened on the broker session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session is up. Fired on the initial connect and on every reconnect.
    Connected,
    /// The session dropped; the transport reconnects on its own.
    ConnectionLost(String),
    /// A message arrived on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
}

/// Receiving end of a transport's session events.
pub type SessionEvents = tokio::sync::mpsc::UnboundedReceiver<SessionEvent>;

/// Publish/subscribe capability of a broker session.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>)
    -> Result<(), TransportError>;

    /// Resolves once the broker granted the subscription.
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Resolves once the broker acknowledged the unsubscribe.
    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// End the session. The event channel closes afterwards.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
