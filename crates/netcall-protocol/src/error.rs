//! Error types for the protocol layer.
//!
//! Every variant here describes a problem with *bytes*: a packet that is too
//! short, a string that is not UTF-8, a chunk that will not decompress.
//! None of them are fatal to the process. The receive path drops the
//! offending packet, logs the error, and moves on to the next one.

/// Errors that can occur while encoding or decoding protocol data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A read ran past the end of the buffer.
    ///
    /// This is the "packet too small, drop it" case. It is never retried.
    #[error("buffer truncated: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// A length-prefixed string did not contain valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The first byte of an envelope is not a known envelope kind.
    #[error("unknown envelope kind: 0x{0:02X}")]
    UnknownEnvelopeKind(u8),

    /// A compressed chunk could not be decompressed.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Record serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Record deserialization failed (turning bytes into a Rust type).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The bytes decode, but violate a protocol rule (negative length,
    /// trailing garbage, a field out of range).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
