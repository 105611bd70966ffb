//! Wire protocol for netcall.
//!
//! This crate defines the bytes two peers exchange:
//!
//! - **Wire codec** ([`Writer`], [`Reader`], [`Value`]): fixed-width
//!   scalars and length-prefixed strings/blobs.
//! - **Calls** ([`encode_call`], [`open_call`]): a parameter count followed
//!   by the parameters.
//! - **Envelopes** ([`Envelope`]): the whole-call and chunk packet forms.
//! - **Compression** ([`compress_chunk`], [`decompress_chunk`]): LZ4, used
//!   only for chunks.
//! - **Records** ([`Codec`], [`JsonCodec`]): serde types carried as blobs.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw packets) and the RPC
//! layer (registry, fragmentation, dispatch). It knows nothing about peers,
//! handlers or pending transfers.
//!
//! ```text
//! Transport (packets) → Protocol (Envelope, call body) → RPC (dispatch)
//! ```

mod call;
mod codec;
mod compression;
mod envelope;
mod error;
mod types;
pub mod wire;

pub use call::{encode_call, open_call};
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use compression::{compress_chunk, decompress_chunk};
pub use envelope::{
    ChunkEnvelope, Envelope, WholeEnvelope, KIND_CHUNK, KIND_WHOLE, MIN_ENVELOPE_LEN,
};
pub use error::ProtocolError;
pub use types::{FunctionId, NodeRole, Role, TransferId};
pub use wire::{Reader, Value, Writer};
