//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The rest of the server only sees the [`Codec`] trait; which wire format
//! is in use is decided once, when the server is built.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task and by the reactor thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do
    /// not match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use castle_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let msg: ClientMessage = codec.decode(br#"{"type":"move","notation":"e2e4"}"#).unwrap();
/// assert_eq!(msg, ClientMessage::Move { notation: "e2e4".into() });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClockReading, ServerMessage};

    #[test]
    fn test_encode_produces_tagged_json_text() {
        let bytes = JsonCodec
            .encode(&ServerMessage::TimeUpdate {
                clock: ClockReading {
                    white_ms: 1000,
                    black_ms: 2000,
                },
            })
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""type":"time-update""#));
    }

    #[test]
    fn test_decode_malformed_returns_decode_error() {
        let result: Result<ServerMessage, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
