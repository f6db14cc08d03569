//! Wire encodings for [`Payload`]: MessagePack maps as the primary binary
//! form, JSON as the human-readable fallback every consumer must accept.

use crate::model::Payload;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("msgpack encode failed: {0}")]
    Binary(#[from] rmp_serde::encode::Error),
    #[error("json encode failed: {0}")]
    Text(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("payload is neither msgpack ({binary}) nor json ({text})")]
pub struct DecodeError {
    pub binary: rmp_serde::decode::Error,
    pub text: serde_json::Error,
}

/// Frame format a websocket client asked for.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum WireFormat {
    #[default]
    Binary,
    Text,
}

pub fn encode_binary<L: Serialize>(payload: &Payload<L>) -> Result<Bytes, EncodeError> {
    Ok(Bytes::from(rmp_serde::to_vec_named(payload)?))
}

pub fn encode_text<L: Serialize>(payload: &Payload<L>) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(payload)?)
}

/// Tries msgpack first, then JSON.
pub fn decode<L: DeserializeOwned>(raw: &[u8]) -> Result<Payload<L>, DecodeError> {
    match rmp_serde::from_slice(raw) {
        Ok(payload) => Ok(payload),
        Err(binary) => serde_json::from_slice(raw).map_err(|text| DecodeError { binary, text }),
    }
}

/// Re-encodes a published msgpack frame as JSON without knowing which log
/// variant it carries.
pub fn transcode_to_text(raw: &[u8]) -> Result<String, DecodeError> {
    let value: serde_json::Value = match rmp_serde::from_slice(raw) {
        Ok(value) => value,
        Err(binary) => {
            return serde_json::from_slice::<serde_json::Value>(raw)
                .map(|value| value.to_string())
                .map_err(|text| DecodeError { binary, text });
        }
    };
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceSnapshot, RosterEntry};

    fn sample() -> Payload<String> {
        Payload {
            timestamp: 1_744_275_600_000,
            device_details: DeviceSnapshot {
                firmware: Some("Ver 6.60".into()),
                ..Default::default()
            },
            users: vec![RosterEntry {
                user_id: "36".into(),
                name: "Ana".into(),
                privilege: 0,
            }],
            logs: vec!["x".into()],
        }
    }

    #[test]
    fn binary_is_a_named_map() {
        let raw = encode_binary(&sample()).unwrap();
        let value: serde_json::Value = rmp_serde::from_slice(&raw).unwrap();
        assert_eq!(value["deviceDetails"]["firmware"], "Ver 6.60");
        assert_eq!(value["users"][0]["userId"], "36");
    }

    #[test]
    fn decode_falls_back_to_json() {
        let text = encode_text(&sample()).unwrap();
        let decoded: Payload<String> = decode(text.as_bytes()).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode::<String>(b"\xc1not a payload").is_err());
    }

    #[test]
    fn transcoded_text_decodes_to_same_payload() {
        let raw = encode_binary(&sample()).unwrap();
        let text = transcode_to_text(&raw).unwrap();
        let decoded: Payload<String> = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, sample());
    }
}
