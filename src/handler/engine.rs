//! Handler engine
//!
//! Outbound, the four `send_*` operations build the topic, encode the
//! document and publish it once. Failures go back to the caller, which owns
//! the retry policy.
//!
//! Inbound, every message on the command topic becomes its own task:
//! topic check, decode, device identity check, downlink lock, then a blocking
//! write to the downlink queue. The queue is bounded, so a slow consumer
//! throttles acceptance of new commands. Any failure drops that one message.
//!
//! Shutdown order in [`Handler::close`]: unsubscribe, detach the queue sender,
//! wait for in-flight tasks, disconnect. The queue receiver sees end of
//! stream once the last in-flight task is done and never afterwards gets a
//! new item.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::MqttSettings;
use crate::handler::lock::{DownlinkLock, LockOutcome};
use crate::handler::topic::{TX_TOPIC, TopicAddress};
use crate::payload::codec;
use crate::payload::{
    AckNotification, DataDownPayload, DataUpPayload, ErrorNotification, JoinNotification,
    Notification,
};
use crate::persistence::LockStore;
use crate::transport::{MqttTransport, QoS, SessionEvent, SessionEvents, Transport};
use crate::utils::error::HandlerError;

/// Pause between two attempts to subscribe to the command topic.
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Downlink commands waiting for the network-server core.
pub const DOWNLINK_QUEUE_CAPACITY: usize = 1;

/// Receiving end of the downlink queue.
pub type DataDownReceiver = mpsc::Receiver<DataDownPayload>;

#[derive(Clone)]
pub struct Handler {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    lock: DownlinkLock,
    data_down: Mutex<Option<mpsc::Sender<DataDownPayload>>>,
    in_flight: TaskTracker,
    // stops the resubscribe loop; set once the broker accepted the unsubscribe
    unsubscribed: AtomicBool,
    closed: AtomicBool,
    // one close() at a time, later callers wait for the first to finish
    close_gate: tokio::sync::Mutex<()>,
}

impl Handler {
    /// Connect to the MQTT broker named in `settings`.
    ///
    /// A failed first connection is returned as-is; there is no retry here.
    pub async fn connect(
        settings: &MqttSettings,
        store: Arc<dyn LockStore>,
    ) -> Result<(Self, DataDownReceiver), HandlerError> {
        info!(server = %settings.server, "connecting to mqtt broker");
        let (transport, events) =
            MqttTransport::connect(&settings.server, &settings.username, &settings.password)
                .await
                .map_err(HandlerError::Connect)?;

        Ok(Self::with_transport(Arc::new(transport), events, store))
    }

    /// Build a handler on an established session.
    ///
    /// Must be called within a Tokio runtime: the session events are consumed
    /// by a spawned task.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        events: SessionEvents,
        store: Arc<dyn LockStore>,
    ) -> (Self, DataDownReceiver) {
        let (tx, rx) = mpsc::channel(DOWNLINK_QUEUE_CAPACITY);
        let inner = Arc::new(Inner {
            transport,
            lock: DownlinkLock::new(store),
            data_down: Mutex::new(Some(tx)),
            in_flight: TaskTracker::new(),
            unsubscribed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_gate: tokio::sync::Mutex::new(()),
        });

        tokio::spawn(inner.clone().dispatch(events));
        (Self { inner }, rx)
    }

    pub async fn send_data_up(
        &self,
        app_eui: &str,
        dev_eui: &str,
        payload: &DataUpPayload,
    ) -> Result<(), HandlerError> {
        self.publish(app_eui, dev_eui, payload).await
    }

    pub async fn send_join_notification(
        &self,
        app_eui: &str,
        dev_eui: &str,
        payload: &JoinNotification,
    ) -> Result<(), HandlerError> {
        self.publish(app_eui, dev_eui, payload).await
    }

    pub async fn send_ack_notification(
        &self,
        app_eui: &str,
        dev_eui: &str,
        payload: &AckNotification,
    ) -> Result<(), HandlerError> {
        self.publish(app_eui, dev_eui, payload).await
    }

    pub async fn send_error_notification(
        &self,
        app_eui: &str,
        dev_eui: &str,
        payload: &ErrorNotification,
    ) -> Result<(), HandlerError> {
        self.publish(app_eui, dev_eui, payload).await
    }

    async fn publish<P: Notification>(
        &self,
        app_eui: &str,
        dev_eui: &str,
        payload: &P,
    ) -> Result<(), HandlerError> {
        let bytes = codec::encode(payload)?;
        let topic = TopicAddress::new(app_eui, dev_eui).topic(P::KIND);

        info!(topic = %topic, "publishing {} payload", P::NAME);
        self.inner
            .transport
            .publish(&topic, QoS::AtMostOnce, bytes)
            .await
            .map_err(|source| HandlerError::Publish {
                kind: P::NAME,
                source,
            })
    }

    /// Number of inbound messages still being handled.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Stop the handler.
    ///
    /// Returns the unsubscribe error if the broker could not be told to stop
    /// delivering; the handler stays usable in that case. A call made while
    /// another one is running returns when that one has finished; calling it
    /// again after success does nothing.
    pub async fn close(&self) -> Result<(), HandlerError> {
        let _gate = self.inner.close_gate.lock().await;
        if self.inner.closed.load(Ordering::SeqCst) {
            debug!("handler already closed");
            return Ok(());
        }

        info!("closing handler");
        info!(topic = TX_TOPIC, "unsubscribing from tx topic");
        if let Err(source) = self.inner.transport.unsubscribe(TX_TOPIC).await {
            return Err(HandlerError::Unsubscribe {
                topic: TX_TOPIC.to_string(),
                source,
            });
        }
        self.inner.unsubscribed.store(true, Ordering::SeqCst);

        // inbound tasks started from here on find no sender
        let sender = self.inner.detach_queue();

        info!(in_flight = self.inner.in_flight.len(), "handling last items in queue");
        self.inner.in_flight.close();
        self.inner.in_flight.wait().await;
        drop(sender);

        if let Err(e) = self.inner.transport.disconnect().await {
            warn!(error = %e, "disconnecting from broker error");
        }
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Inner {
    async fn dispatch(self: Arc<Self>, mut events: SessionEvents) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Connected => {
                    info!("connected to mqtt broker");
                    tokio::spawn(self.clone().on_connected());
                }
                SessionEvent::ConnectionLost(reason) => {
                    error!(reason = %reason, "mqtt connection error");
                }
                SessionEvent::Message { topic, payload } => self.on_message(topic, payload),
            }
        }
        debug!("session event stream ended");
    }

    /// Subscribe to the command topic, retrying until the broker accepts.
    async fn on_connected(self: Arc<Self>) {
        while !self.unsubscribed.load(Ordering::SeqCst) {
            info!(topic = TX_TOPIC, "subscribing to tx topic");
            match self.transport.subscribe(TX_TOPIC, QoS::ExactlyOnce).await {
                Ok(()) => return,
                Err(e) => {
                    error!(topic = TX_TOPIC, error = %e, "subscribe error");
                    tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                }
            }
        }
    }

    fn on_message(self: &Arc<Self>, topic: String, payload: Vec<u8>) {
        // held while spawning so close() cannot detach in between
        let data_down = self.data_down.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = data_down.as_ref().cloned() else {
            debug!(topic = %topic, "handler closed, dropping data-down payload");
            return;
        };

        let inner = self.clone();
        self.in_flight
            .spawn(async move { inner.handle_tx_payload(topic, payload, tx).await });
    }

    async fn handle_tx_payload(
        &self,
        topic: String,
        payload: Vec<u8>,
        data_down: mpsc::Sender<DataDownPayload>,
    ) {
        info!(topic = %topic, "data-down payload received");

        // topic-level authorization is only meaningful if the payload
        // addresses the same device as the topic
        let Some(address) = TopicAddress::parse_tx(&topic) else {
            error!(topic = %topic, "topic does not match tx topic pattern");
            return;
        };

        let pl: DataDownPayload = match codec::decode(&payload) {
            Ok(pl) => pl,
            Err(e) => {
                error!(
                    topic = %topic,
                    data_base64 = %codec::raw_for_log(&payload),
                    error = %e,
                    "tx payload unmarshal error"
                );
                return;
            }
        };

        if address.dev_eui != pl.dev_eui {
            warn!(
                topic_dev_eui = %address.dev_eui,
                payload_dev_eui = %pl.dev_eui,
                "topic DevEUI must match payload DevEUI"
            );
            return;
        }

        // every instance receives the command; only the lock winner forwards it
        if self.lock.try_acquire(&pl.dev_eui, &pl.reference).await != LockOutcome::Acquired {
            return;
        }

        if data_down.send(pl).await.is_err() {
            warn!(topic = %topic, "data-down receiver dropped, discarding payload");
        }
    }

    fn detach_queue(&self) -> Option<mpsc::Sender<DataDownPayload>> {
        self.data_down
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("lock", &self.inner.lock)
            .field("in_flight", &self.inner.in_flight.len())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}
