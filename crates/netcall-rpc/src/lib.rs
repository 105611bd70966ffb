//! Remote function calls for netcall.
//!
//! This crate turns "call function 7 on that peer with these parameters"
//! into packets, and packets back into handler invocations:
//!
//! 1. **Registry**: which handler runs for which id, parameter count and
//!    role ([`FunctionRegistry`])
//! 2. **Fragmentation**: splitting large calls into compressed chunks, with
//!    a per-transfer in-flight ceiling ([`Fragmenter`], [`PendingSendQueue`])
//! 3. **Reassembly**: putting chunks back together ([`Reassembler`])
//! 4. **Dispatch**: tying it all together per node ([`ProtocolContext`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Node (above)  ← owns connections, drives the context once per tick
//!     ↕
//! RPC Layer (this crate)  ← registry, fragmentation, reassembly, dispatch
//!     ↕
//! Protocol Layer (below)  ← wire codec, envelopes, compression
//! ```
//!
//! Nothing in this crate is async or does I/O. Outgoing packets are written
//! into a [`PacketSink`] and the caller decides when to put them on the
//! wire.

mod config;
mod context;
mod error;
mod fragmenter;
mod pending;
mod reassembler;
mod registry;
mod sink;

pub use config::{ProtocolConfig, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_SPLIT_THRESHOLD};
pub use context::{PeerPurge, ProtocolContext, ReceiveOutcome, CONTINUE_TRANSFER};
pub use error::RpcError;
pub use fragmenter::{crosses_ceiling, ChunkPlan, EmitOutcome, Fragmenter, Fragments, OutgoingTransfer};
pub use pending::PendingSendQueue;
pub use reassembler::{ChunkOutcome, Reassembler};
pub use registry::{CallContext, FunctionDescriptor, FunctionRegistry, Handler};
pub use sink::{OutgoingPacket, Outbox, PacketSink, Recipient};
