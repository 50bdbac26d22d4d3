//! JSON codec for broker payloads.
//!
//! Pure functions, no I/O. Byte fields travel as standard base64 strings.

use serde::de::DeserializeOwned;

use crate::payload::Notification;
use crate::utils::error::CodecError;

/// Serialize an outbound document.
pub fn encode<P: Notification>(payload: &P) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(payload).map_err(|source| CodecError::Encode {
        kind: P::NAME,
        source,
    })
}

/// Deserialize an inbound document. Unknown fields are ignored.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

/// Render raw bytes for a log line when they could not be decoded.
pub fn raw_for_log(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// `serde(with = ...)` adapter for `Vec<u8>` fields stored as base64.
///
/// A `null` or missing value decodes as an empty buffer.
pub mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
