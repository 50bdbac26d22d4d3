//! MQTT transport
//!
//! Wraps a `rumqttc` client. Responsibilities:
//! - Parse the broker address and build the client options
//! - Drive the event loop in a background task and translate its events
//!   into [`SessionEvent`]s
//! - Fail construction when the first connection attempt fails
//! - Keep polling after the session drops, which makes rumqttc reconnect
//! - Match SUBACKs and UNSUBACKs to the call waiting for them

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeReasonCode,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::transport::{SessionEvent, SessionEvents, Transport};
use crate::utils::error::TransportError;

const DEFAULT_PORT: u16 = 1883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

type AckSlot = Arc<Mutex<Option<oneshot::Sender<Result<(), TransportError>>>>>;

pub struct MqttTransport {
    client: AsyncClient,
    pending_suback: AckSlot,
    pending_unsuback: AckSlot,
    // one request of each kind in flight so an ack maps to its caller
    subscribe_gate: tokio::sync::Mutex<()>,
    unsubscribe_gate: tokio::sync::Mutex<()>,
    closing: Arc<AtomicBool>,
}

/// Split `tcp://host:port`, `mqtt://host:port` or `host[:port]` into host and port.
pub fn parse_broker_address(server: &str) -> Result<(String, u16), TransportError> {
    let invalid = || TransportError::InvalidAddress(server.to_string());

    let rest = match server.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => server,
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (rest, DEFAULT_PORT),
    };

    if host.is_empty() || host.contains('/') {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}

impl MqttTransport {
    /// Connect to `server` and wait for the broker to accept the session.
    ///
    /// Empty `username` means no credentials are sent.
    pub async fn connect(
        server: &str,
        username: &str,
        password: &str,
    ) -> Result<(Self, SessionEvents), TransportError> {
        let (host, port) = parse_broker_address(server)?;

        let client_id = format!("nodelink-{}", Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        if !username.is_empty() {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = oneshot::channel();

        let transport = Self {
            client,
            pending_suback: Arc::new(Mutex::new(None)),
            pending_unsuback: Arc::new(Mutex::new(None)),
            subscribe_gate: tokio::sync::Mutex::new(()),
            unsubscribe_gate: tokio::sync::Mutex::new(()),
            closing: Arc::new(AtomicBool::new(false)),
        };

        tokio::spawn(drive(
            eventloop,
            events_tx,
            transport.pending_suback.clone(),
            transport.pending_unsuback.clone(),
            transport.closing.clone(),
            connected_tx,
        ));

        match connected_rx.await {
            Ok(Ok(())) => Ok((transport, events_rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Closed),
        }
    }

}

fn set_pending(slot: &AckSlot, tx: Option<oneshot::Sender<Result<(), TransportError>>>) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = tx;
}

fn take_pending(slot: &AckSlot) -> Option<oneshot::Sender<Result<(), TransportError>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Wait for the ack that `drive` routes into `slot`.
async fn await_ack(
    slot: &AckSlot,
    rx: oneshot::Receiver<Result<(), TransportError>>,
    packet: &'static str,
) -> Result<(), TransportError> {
    match tokio::time::timeout(ACK_TIMEOUT, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(TransportError::Closed),
        Err(_) => {
            set_pending(slot, None);
            Err(TransportError::Timeout(packet))
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.client.publish(topic, qos, false, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        let _gate = self.subscribe_gate.lock().await;

        let (tx, rx) = oneshot::channel();
        set_pending(&self.pending_suback, Some(tx));

        if let Err(e) = self.client.subscribe(topic, qos).await {
            set_pending(&self.pending_suback, None);
            return Err(e.into());
        }

        await_ack(&self.pending_suback, rx, "SUBACK")
            .await
            .map_err(|e| match e {
                TransportError::SubscribeRefused(_) => {
                    TransportError::SubscribeRefused(topic.to_string())
                }
                other => other,
            })
    }

    /// Resolves once the broker acknowledged the unsubscribe.
    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        let _gate = self.unsubscribe_gate.lock().await;

        let (tx, rx) = oneshot::channel();
        set_pending(&self.pending_unsuback, Some(tx));

        if let Err(e) = self.client.unsubscribe(topic).await {
            set_pending(&self.pending_unsuback, None);
            return Err(e.into());
        }

        await_ack(&self.pending_unsuback, rx, "UNSUBACK").await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closing.store(true, Ordering::SeqCst);
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Poll the event loop until the session is closed on purpose.
async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::UnboundedSender<SessionEvent>,
    pending_suback: AckSlot,
    pending_unsuback: AckSlot,
    closing: Arc<AtomicBool>,
    connected: oneshot::Sender<Result<(), TransportError>>,
) {
    let mut connected = Some(connected);

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) if ack.code != ConnectReturnCode::Success => {
                let refused = TransportError::Refused(format!("{:?}", ack.code));
                if let Some(tx) = connected.take() {
                    let _ = tx.send(Err(refused));
                    return;
                }
                warn!(error = %refused, "mqtt broker refused reconnect");
                SessionEvent::ConnectionLost(refused.to_string())
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if let Some(tx) = connected.take() {
                    let _ = tx.send(Ok(()));
                }
                SessionEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => SessionEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            },
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                let refused = suback
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                if let Some(tx) = take_pending(&pending_suback) {
                    let result = if refused {
                        Err(TransportError::SubscribeRefused(String::new()))
                    } else {
                        Ok(())
                    };
                    let _ = tx.send(result);
                }
                continue;
            }
            Ok(Event::Incoming(Packet::UnsubAck(_))) => {
                if let Some(tx) = take_pending(&pending_unsuback) {
                    let _ = tx.send(Ok(()));
                }
                continue;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("mqtt session closed");
                return;
            }
            Ok(_) => continue,
            Err(ConnectionError::RequestsDone) => {
                debug!("mqtt client dropped, stopping event loop");
                return;
            }
            Err(e) => {
                if let Some(tx) = connected.take() {
                    let _ = tx.send(Err(e.into()));
                    return;
                }
                if closing.load(Ordering::SeqCst) {
                    return;
                }
                for slot in [&pending_suback, &pending_unsuback] {
                    if let Some(tx) = take_pending(slot) {
                        let _ = tx.send(Err(TransportError::Closed));
                    }
                }
                error!(error = %e, "mqtt event loop error");
                let lost = SessionEvent::ConnectionLost(e.to_string());
                if events.send(lost).is_err() {
                    return;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if events.send(event).is_err() {
            debug!("session event receiver dropped, stopping event loop");
            return;
        }
    }
}
