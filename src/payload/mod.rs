//! The `payload` module defines the JSON documents exchanged with
//! applications over the broker and the codec that turns them into bytes.
//!
//! Outbound documents (uplink data and the join, ack and error
//! notifications) implement [`Notification`], which ties each one to the topic
//! kind it is published on. The only inbound document is the
//! [`DataDownPayload`] downlink command.

pub mod codec;
pub mod message;

pub use message::{
    AckNotification, DataDownPayload, DataRate, DataUpPayload, ErrorNotification,
    JoinNotification, Notification, RxInfo, TxInfo,
};
