//! Primitive (de)serialization into a flat byte buffer.
//!
//! Every multi-byte integer and float is little-endian and fixed-width.
//! Strings and blobs carry a `u32` length prefix:
//!
//! ```text
//! i32      → 4 bytes
//! i64      → 8 bytes
//! string   → [len: u32][len bytes of UTF-8]
//! blob     → [len: u32][len bytes]
//! ```
//!
//! [`Writer`] appends to a growing `Vec<u8>`. [`Reader`] walks a borrowed
//! slice with a cursor and returns [`ProtocolError::Truncated`] instead of
//! panicking when a read would run past the end. Decoding what a `Writer`
//! produced with the matching `read_*` calls always yields equal values.

use serde::{de::DeserializeOwned, Serialize};

use crate::{Codec, ProtocolError};

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends encoded values to an owned buffer.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrows the bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns the encoded buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the string is longer
    /// than a `u32` prefix can describe.
    pub fn write_str(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a length-prefixed blob.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the blob is longer than
    /// a `u32` prefix can describe.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        let len = u32::try_from(value.len()).map_err(|_| {
            ProtocolError::InvalidMessage(format!(
                "field of {} bytes exceeds the u32 length prefix",
                value.len()
            ))
        })?;
        self.write_u32(len);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Appends bytes with no length prefix. The reader must already know
    /// how many to expect.
    pub fn write_raw(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    /// Writes a compound record as a blob, serialized with `codec`.
    pub fn write_record<C: Codec, T: Serialize>(
        &mut self,
        codec: &C,
        value: &T,
    ) -> Result<(), ProtocolError> {
        let encoded = codec.encode(value)?;
        self.write_bytes(&encoded)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Reads encoded values from a borrowed buffer, advancing a cursor.
///
/// This is what handlers receive: they pull their parameters off in the
/// same order the caller wrote them.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current cursor offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes exactly `n` bytes, or fails without moving the cursor.
    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if n > self.remaining() {
            return Err(ProtocolError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a bool written as a single `0`/`1` byte.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidMessage(format!(
                "bool byte must be 0 or 1, got {other}"
            ))),
        }
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.read_blob()?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Reads a length-prefixed blob into an owned buffer.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.read_blob()?.to_vec())
    }

    /// Reads a length-prefixed blob without copying it.
    pub fn read_blob(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    /// Reads `n` bytes that were written with no length prefix.
    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(n)
    }

    /// Reads a compound record blob and deserializes it with `codec`.
    pub fn read_record<C: Codec, T: DeserializeOwned>(
        &mut self,
        codec: &C,
    ) -> Result<T, ProtocolError> {
        let blob = self.read_blob()?;
        codec.decode(blob)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// One call parameter.
///
/// Callers build a `&[Value]` for `invoke`; the slice length is the call's
/// parameter count. Values go on the wire untagged, exactly as the matching
/// `Writer::write_*` method would write them, so the handler reads them back
/// with the corresponding `Reader::read_*` calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Serializes a compound record into a [`Value::Bytes`] parameter.
    ///
    /// The handler reads it back with [`Reader::read_record`] and the same
    /// codec.
    pub fn record<C: Codec, T: Serialize>(
        codec: &C,
        value: &T,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::Bytes(codec.encode(value)?))
    }

    /// Appends this value to `writer`.
    pub fn write_to(&self, writer: &mut Writer) -> Result<(), ProtocolError> {
        match self {
            Self::Bool(v) => writer.write_bool(*v),
            Self::U8(v) => writer.write_u8(*v),
            Self::I32(v) => writer.write_i32(*v),
            Self::U32(v) => writer.write_u32(*v),
            Self::I64(v) => writer.write_i64(*v),
            Self::U64(v) => writer.write_u64(*v),
            Self::F32(v) => writer.write_f32(*v),
            Self::F64(v) => writer.write_f64(*v),
            Self::Str(v) => writer.write_str(v)?,
            Self::Bytes(v) => writer.write_bytes(v)?,
        }
        Ok(())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::U8(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_read_back_in_write_order() {
        let mut w = Writer::new();
        w.write_u8(9);
        w.write_bool(true);
        w.write_i32(-42);
        w.write_u32(42);
        w.write_i64(i64::MIN);
        w.write_u64(u64::MAX);
        w.write_f32(1.5);
        w.write_f64(-2.25);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 9);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_i32().unwrap(), -42);
        assert_eq!(r.read_u32().unwrap(), 42);
        assert_eq!(r.read_i64().unwrap(), i64::MIN);
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_f64().unwrap(), -2.25);
        assert!(r.is_empty());
    }

    #[test]
    fn test_integers_are_little_endian() {
        let mut w = Writer::new();
        w.write_i32(1);
        assert_eq!(w.as_bytes(), &[1, 0, 0, 0]);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let mut w = Writer::new();
        w.write_str("hi").unwrap();
        assert_eq!(w.as_bytes(), &[2, 0, 0, 0, b'h', b'i']);

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_string().unwrap(), "hi");
        assert_eq!(r.position(), 6);
    }

    #[test]
    fn test_read_past_end_returns_truncated() {
        let mut r = Reader::new(&[1, 2]);
        let err = r.read_i32().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                needed: 4,
                available: 2
            }
        ));
        // A failed read leaves the cursor where it was.
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_string_prefix_longer_than_buffer_returns_truncated() {
        let mut w = Writer::new();
        w.write_u32(100);
        w.write_raw(b"short");
        let bytes = w.into_bytes();

        let result = Reader::new(&bytes).read_string();
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_read_string_invalid_utf8_returns_error() {
        let mut w = Writer::new();
        w.write_bytes(&[0xFF, 0xFE]).unwrap();
        let bytes = w.into_bytes();

        let result = Reader::new(&bytes).read_string();
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8(_))));
    }

    #[test]
    fn test_read_bool_rejects_other_bytes() {
        let result = Reader::new(&[2]).read_bool();
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_value_write_to_matches_writer_methods() {
        let mut via_value = Writer::new();
        Value::from("hello").write_to(&mut via_value).unwrap();
        Value::from(42i32).write_to(&mut via_value).unwrap();

        let mut direct = Writer::new();
        direct.write_str("hello").unwrap();
        direct.write_i32(42);

        assert_eq!(via_value.as_bytes(), direct.as_bytes());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_record_round_trip_through_json_codec() {
        use crate::JsonCodec;

        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Spawn {
            x: f32,
            y: f32,
            name: String,
        }

        let spawn = Spawn {
            x: 1.0,
            y: -3.5,
            name: "crate".into(),
        };

        let mut w = Writer::new();
        w.write_record(&JsonCodec, &spawn).unwrap();
        w.write_i32(7);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        let decoded: Spawn = r.read_record(&JsonCodec).unwrap();
        assert_eq!(decoded, spawn);
        assert_eq!(r.read_i32().unwrap(), 7);
    }
}
