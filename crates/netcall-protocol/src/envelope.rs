//! Envelopes: the self-describing units that travel over a peer link.
//!
//! Every packet carries exactly one envelope. A call small enough to fit
//! goes out as a single [`WholeEnvelope`]; anything larger is split into a
//! run of [`ChunkEnvelope`]s sharing one transfer id.
//!
//! ```text
//! whole: [kind=0: u8][function_id: i32][payload_len: i64][transfer_id: string]
//!        [payload: payload_len bytes]
//!
//! chunk: [kind=1: u8][function_id: i32][total_payload_len: i64][transfer_id: string]
//!        [remaining_chunks: i32][cumulative_bytes: i64][chunk_len: i32]
//!        [chunk: chunk_len bytes, LZ4-compressed]
//! ```
//!
//! All integers are little-endian. The leading `kind` byte lets a receiver
//! tell the two forms apart without knowing the sender's split threshold.

use crate::{FunctionId, ProtocolError, Reader, TransferId, Writer};

/// Kind byte of a [`WholeEnvelope`].
pub const KIND_WHOLE: u8 = 0;

/// Kind byte of a [`ChunkEnvelope`].
pub const KIND_CHUNK: u8 = 1;

/// Smallest number of bytes any envelope can occupy: kind, function id,
/// length, and the prefix of an empty transfer id.
pub const MIN_ENVELOPE_LEN: usize = 1 + 4 + 8 + 4;

/// A complete call that fits in a single packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WholeEnvelope {
    pub function_id: FunctionId,
    pub transfer_id: TransferId,
    /// The encoded call body, uncompressed.
    pub payload: Vec<u8>,
}

/// One piece of a call too large for a single packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEnvelope {
    pub function_id: FunctionId,
    /// Uncompressed length of the whole call body.
    pub total_payload_len: u64,
    pub transfer_id: TransferId,
    /// Chunks still to come after this one. `0` marks the last chunk.
    pub remaining_chunks: u32,
    /// Compressed bytes emitted for this transfer so far, this chunk
    /// included.
    pub cumulative_bytes: u64,
    /// This chunk's compressed bytes.
    pub data: Vec<u8>,
}

impl ChunkEnvelope {
    /// Returns `true` if this is the last chunk of its transfer.
    pub fn is_last(&self) -> bool {
        self.remaining_chunks == 0
    }

    /// Returns `true` if this is the first chunk of its transfer, i.e. no
    /// bytes were emitted before it.
    pub fn is_first(&self) -> bool {
        self.cumulative_bytes == self.data.len() as u64
    }

    /// Compressed bytes emitted for this transfer before this chunk.
    pub fn bytes_before(&self) -> u64 {
        self.cumulative_bytes.saturating_sub(self.data.len() as u64)
    }
}

/// Either form of envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Whole(WholeEnvelope),
    Chunk(ChunkEnvelope),
}

impl Envelope {
    /// The function this envelope's call targets.
    pub fn function_id(&self) -> FunctionId {
        match self {
            Self::Whole(w) => w.function_id,
            Self::Chunk(c) => c.function_id,
        }
    }

    /// The transfer this envelope belongs to.
    pub fn transfer_id(&self) -> &TransferId {
        match self {
            Self::Whole(w) => &w.transfer_id,
            Self::Chunk(c) => &c.transfer_id,
        }
    }

    /// Encodes the envelope into a packet.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if a length does not fit
    /// its fixed-width wire field.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Whole(w) => {
                let mut out = Writer::with_capacity(
                    MIN_ENVELOPE_LEN + w.transfer_id.as_str().len() + w.payload.len(),
                );
                out.write_u8(KIND_WHOLE);
                out.write_i32(w.function_id.0);
                out.write_i64(to_i64(w.payload.len() as u64, "payload_len")?);
                out.write_str(w.transfer_id.as_str())?;
                out.write_raw(&w.payload);
                Ok(out.into_bytes())
            }
            Self::Chunk(c) => {
                let mut out = Writer::with_capacity(
                    MIN_ENVELOPE_LEN + c.transfer_id.as_str().len() + 16 + c.data.len(),
                );
                out.write_u8(KIND_CHUNK);
                out.write_i32(c.function_id.0);
                out.write_i64(to_i64(c.total_payload_len, "total_payload_len")?);
                out.write_str(c.transfer_id.as_str())?;
                out.write_i32(to_i32(c.remaining_chunks as u64, "remaining_chunks")?);
                out.write_i64(to_i64(c.cumulative_bytes, "cumulative_bytes")?);
                out.write_i32(to_i32(c.data.len() as u64, "chunk_len")?);
                out.write_raw(&c.data);
                Ok(out.into_bytes())
            }
        }
    }

    /// Decodes a packet into an envelope.
    ///
    /// The packet must contain exactly one envelope: a short packet yields
    /// [`ProtocolError::Truncated`], trailing bytes or negative lengths
    /// yield [`ProtocolError::InvalidMessage`].
    pub fn decode(packet: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(packet);
        let kind = r.read_u8()?;
        let function_id = FunctionId(r.read_i32()?);
        let declared_len = from_i64(r.read_i64()?, "payload length")?;
        let transfer_id = TransferId::new(r.read_string()?);

        let envelope = match kind {
            KIND_WHOLE => {
                let payload = r.read_raw(to_usize(declared_len)?)?.to_vec();
                Self::Whole(WholeEnvelope {
                    function_id,
                    transfer_id,
                    payload,
                })
            }
            KIND_CHUNK => {
                let remaining_chunks = from_i32(r.read_i32()?, "remaining_chunks")?;
                let cumulative_bytes = from_i64(r.read_i64()?, "cumulative_bytes")?;
                let chunk_len = from_i32(r.read_i32()?, "chunk_len")?;
                let data = r.read_raw(chunk_len as usize)?.to_vec();
                if cumulative_bytes < chunk_len as u64 {
                    return Err(ProtocolError::InvalidMessage(format!(
                        "cumulative_bytes {cumulative_bytes} is below chunk_len {chunk_len}"
                    )));
                }
                Self::Chunk(ChunkEnvelope {
                    function_id,
                    total_payload_len: declared_len,
                    transfer_id,
                    remaining_chunks,
                    cumulative_bytes,
                    data,
                })
            }
            other => return Err(ProtocolError::UnknownEnvelopeKind(other)),
        };

        if !r.is_empty() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} trailing bytes after envelope",
                r.remaining()
            )));
        }
        Ok(envelope)
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64, ProtocolError> {
    i64::try_from(value).map_err(|_| {
        ProtocolError::InvalidMessage(format!("{field} {value} does not fit in i64"))
    })
}

fn to_i32(value: u64, field: &str) -> Result<i32, ProtocolError> {
    i32::try_from(value).map_err(|_| {
        ProtocolError::InvalidMessage(format!("{field} {value} does not fit in i32"))
    })
}

fn from_i64(value: i64, field: &str) -> Result<u64, ProtocolError> {
    u64::try_from(value)
        .map_err(|_| ProtocolError::InvalidMessage(format!("negative {field}: {value}")))
}

fn from_i32(value: i32, field: &str) -> Result<u32, ProtocolError> {
    u32::try_from(value)
        .map_err(|_| ProtocolError::InvalidMessage(format!("negative {field}: {value}")))
}

fn to_usize(value: u64) -> Result<usize, ProtocolError> {
    usize::try_from(value).map_err(|_| {
        ProtocolError::InvalidMessage(format!("length {value} exceeds address space"))
    })
}
