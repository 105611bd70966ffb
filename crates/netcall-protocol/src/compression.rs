//! LZ4 compression for the chunks of a fragmented call.
//!
//! Only fragmented calls are compressed; a call small enough for a whole
//! envelope skips this module entirely. Each chunk is compressed on its own
//! (with its uncompressed size prepended), so the receiver can decompress
//! chunk by chunk as they arrive.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::ProtocolError;

/// Size of the little-endian `u32` header `lz4_flex` prepends.
const SIZE_PREFIX_LEN: usize = 4;

/// Compresses one raw chunk.
pub fn compress_chunk(raw: &[u8]) -> Vec<u8> {
    compress_prepend_size(raw)
}

/// Decompresses one chunk produced by [`compress_chunk`].
///
/// `max_len` bounds the declared uncompressed size, so a corrupt or hostile
/// header cannot make us allocate an arbitrary amount of memory.
///
/// # Errors
/// - [`ProtocolError::Truncated`] if the size header is missing
/// - [`ProtocolError::InvalidMessage`] if the declared size exceeds `max_len`
/// - [`ProtocolError::Decompress`] if the LZ4 block is malformed or yields
///   fewer bytes than its header declares
pub fn decompress_chunk(
    compressed: &[u8],
    max_len: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let header: [u8; SIZE_PREFIX_LEN] = compressed
        .get(..SIZE_PREFIX_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(ProtocolError::Truncated {
            needed: SIZE_PREFIX_LEN,
            available: compressed.len(),
        })?;
    let declared = u32::from_le_bytes(header) as usize;
    if declared > max_len {
        return Err(ProtocolError::InvalidMessage(format!(
            "chunk declares {declared} uncompressed bytes, limit is {max_len}"
        )));
    }

    let out = decompress_size_prepended(compressed)
        .map_err(|e| ProtocolError::Decompress(e.to_string()))?;
    if out.len() != declared {
        return Err(ProtocolError::Decompress(format!(
            "block declares {declared} bytes but yielded {}",
            out.len()
        )));
    }
    Ok(out)
}
