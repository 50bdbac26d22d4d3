//! # nodelink
//!
//! `nodelink` connects a device network server to applications over an MQTT
//! broker. Applications receive uplink data and join, ack and error
//! notifications on per-device topics and send downlink commands on a
//! per-device `tx` topic.
//!
//! Every server instance subscribed to the broker receives every downlink
//! command, so the handler validates each command against its topic and uses
//! a short-lived shared lock to make sure only one instance forwards it.
//!
//! ## Core Modules
//!
//! - `handler`: the [`Handler`] bridging the network-server core and the
//!   broker, topic building/parsing and the downlink lock.
//! - `payload`: the JSON documents exchanged with applications and their codec.
//! - `transport`: the broker session (`rumqttc`) and an in-process transport.
//! - `persistence`: the shared lock store (`sled`).
//! - `config`: loading settings from file and environment.
//! - `utils`: error types and logging.

pub mod config;
pub mod handler;
pub mod payload;
pub mod persistence;
pub mod transport;
pub mod utils;

pub use handler::Handler;
