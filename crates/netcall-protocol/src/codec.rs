//! Codec trait and implementations for compound record parameters.
//!
//! Scalars, strings and blobs have a fixed wire form (see [`crate::wire`]).
//! Anything richer (a spawn description, a level snapshot) is a "record":
//! a `serde` type that a [`Codec`] turns into a blob. The RPC layer never
//! looks inside that blob; it is written with [`Writer::write_record`] and
//! read with [`Reader::read_record`].
//!
//! Currently we provide [`JsonCodec`]. Another format only needs a new
//! `Codec` impl; nothing else changes.
//!
//! [`Writer::write_record`]: crate::Writer::write_record
//! [`Reader::read_record`]: crate::Reader::read_record

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` so one codec instance can be shared by handlers
/// running on whatever task drives the node.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable, so record parameters can be inspected in packet dumps.
/// Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use netcall_protocol::{Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&(3u32, "spawn")).unwrap();
/// let decoded: (u32, String) = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, (3, "spawn".to_string()));
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

    #[test]
    fn test_json_codec_decode_garbage_returns_error() {
        let result: Result<Vec<u32>, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_wrong_shape_returns_error() {
        let result: Result<(u32, u32), _> = JsonCodec.decode(br#"{"name":"x"}"#);
        assert!(result.is_err());
    }
}
