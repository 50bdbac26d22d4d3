use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::handler::topic::TopicKind;
use crate::payload::codec::base64_bytes;

/// An outbound document published to applications.
///
/// `KIND` selects the topic suffix, `NAME` is used in logs and errors.
pub trait Notification: Serialize {
    const KIND: TopicKind;
    const NAME: &'static str;
}

/// Data-rate of a transmission.
///
/// LoRa transmissions carry a spread factor, FSK transmissions a bitrate;
/// the unused one is omitted from the document. Zero counts as unused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRate {
    pub modulation: String,
    pub bandwidth: u32,
    #[serde(default, skip_serializing_if = "unset")]
    pub spread_factor: Option<u8>,
    #[serde(default, skip_serializing_if = "unset")]
    pub bitrate: Option<u32>,
}

fn unset<T: Default + PartialEq>(value: &Option<T>) -> bool {
    value.as_ref().is_none_or(|v| *v == T::default())
}

/// Receive metadata reported by a single gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RxInfo {
    pub mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    pub rssi: i32,
    #[serde(rename = "loRaSNR")]
    pub lora_snr: f64,
}

/// Transmit metadata of an uplink frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInfo {
    pub frequency: i64,
    pub data_rate: DataRate,
    pub adr: bool,
    pub code_rate: String,
}

/// Uplink data received from a device, published on the `rx` topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataUpPayload {
    #[serde(rename = "devEUI")]
    pub dev_eui: String,
    #[serde(rename = "rxInfo")]
    pub rx_info: Vec<RxInfo>,
    #[serde(rename = "txInfo")]
    pub tx_info: TxInfo,
    #[serde(rename = "fCnt")]
    pub f_cnt: u32,
    #[serde(rename = "fPort")]
    pub f_port: u8,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Downlink command sent by an application on the `tx` topic.
///
/// Every field falls back to its default when missing; the handler rejects
/// commands whose `dev_eui` does not match the topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataDownPayload {
    pub reference: String,
    pub confirmed: bool,
    #[serde(rename = "devEUI")]
    pub dev_eui: String,
    #[serde(rename = "fPort")]
    pub f_port: u8,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Sent when a device has joined, published on the `join` topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinNotification {
    #[serde(rename = "devAddr")]
    pub dev_addr: String,
    #[serde(rename = "devEUI")]
    pub dev_eui: String,
}

/// Sent when a device acknowledged a confirmed downlink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AckNotification {
    pub reference: String,
    #[serde(rename = "devEUI")]
    pub dev_eui: String,
}

/// Sent when handling a device's traffic failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotification {
    #[serde(rename = "devEUI")]
    pub dev_eui: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(rename = "error")]
    pub message: String,
}

impl Notification for DataUpPayload {
    const KIND: TopicKind = TopicKind::Data;
    const NAME: &'static str = "data-up";
}

impl Notification for JoinNotification {
    const KIND: TopicKind = TopicKind::Join;
    const NAME: &'static str = "join notification";
}

impl Notification for AckNotification {
    const KIND: TopicKind = TopicKind::Ack;
    const NAME: &'static str = "ack notification";
}

impl Notification for ErrorNotification {
    const KIND: TopicKind = TopicKind::Error;
    const NAME: &'static str = "error notification";
}
