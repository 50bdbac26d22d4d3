//! In-process transport.
//!
//! Nothing leaves the process: publishes are recorded, subscriptions are kept
//! in a list and messages are delivered by calling [`LocalTransport::deliver`].
//! Subscribe and publish failures can be scripted, which makes it the
//! transport of choice for exercising a handler without a broker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::transport::{QoS, SessionEvent, SessionEvents, Transport, filter_matches};
use crate::utils::error::TransportError;

/// A message handed to [`Transport::publish`].
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct LocalState {
    published: Vec<Published>,
    subscriptions: Vec<(String, QoS)>,
    subscribe_attempts: usize,
    failing_subscribes: usize,
    publish_failure: Option<String>,
    unsubscribe_failure: Option<String>,
    unsubscribe_delay: Duration,
}

#[derive(Debug)]
pub struct LocalTransport {
    state: Mutex<LocalState>,
    events: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
}

impl LocalTransport {
    pub fn new() -> (Arc<Self>, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            state: Mutex::new(LocalState::default()),
            events: Mutex::new(Some(tx)),
        };
        (Arc::new(transport), rx)
    }

    /// Emit a raw session event. Returns `false` once disconnected.
    pub fn inject(&self, event: SessionEvent) -> bool {
        match lock(&self.events).as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn connect(&self) -> bool {
        self.inject(SessionEvent::Connected)
    }

    /// Report a lost session. Subscriptions do not survive it.
    pub fn drop_connection(&self, reason: &str) -> bool {
        lock(&self.state).subscriptions.clear();
        self.inject(SessionEvent::ConnectionLost(reason.to_string()))
    }

    /// Deliver a message if a current subscription matches `topic`.
    pub fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        let subscribed = lock(&self.state)
            .subscriptions
            .iter()
            .any(|(filter, _)| filter_matches(filter, topic));
        subscribed
            && self.inject(SessionEvent::Message {
                topic: topic.to_string(),
                payload: payload.into(),
            })
    }

    /// Make the next `n` subscribe calls fail.
    pub fn fail_next_subscribes(&self, n: usize) {
        lock(&self.state).failing_subscribes = n;
    }

    /// Make every publish fail with `reason`, or succeed again with `None`.
    pub fn fail_publishes(&self, reason: Option<&str>) {
        lock(&self.state).publish_failure = reason.map(str::to_string);
    }

    pub fn fail_unsubscribes(&self, reason: Option<&str>) {
        lock(&self.state).unsubscribe_failure = reason.map(str::to_string);
    }

    /// Hold every unsubscribe call for `delay` before it answers.
    pub fn delay_unsubscribes(&self, delay: Duration) {
        lock(&self.state).unsubscribe_delay = delay;
    }

    pub fn published(&self) -> Vec<Published> {
        lock(&self.state).published.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.state)
            .subscriptions
            .iter()
            .map(|(filter, _)| filter.clone())
            .collect()
    }

    pub fn subscribe_attempts(&self) -> usize {
        lock(&self.state).subscribe_attempts
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.events).is_some()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if let Some(reason) = &state.publish_failure {
            return Err(TransportError::Injected(reason.clone()));
        }
        state.published.push(Published {
            topic: topic.to_string(),
            qos,
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.subscribe_attempts += 1;
        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(TransportError::SubscribeRefused(topic.to_string()));
        }
        if !state.subscriptions.iter().any(|(filter, _)| filter == topic) {
            state.subscriptions.push((topic.to_string(), qos));
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        let delay = lock(&self.state).unsubscribe_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = lock(&self.state);
        if let Some(reason) = &state.unsubscribe_failure {
            return Err(TransportError::Injected(reason.clone()));
        }
        state.subscriptions.retain(|(filter, _)| filter != topic);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        lock(&self.events).take();
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
