//! Error types for the RPC layer.

use netcall_protocol::{FunctionId, ProtocolError, Role, TransferId};
use netcall_transport::PeerId;

/// Errors that can occur while registering, invoking or receiving calls.
///
/// They fall in two groups:
///
/// - **Programmer errors** (`DuplicateDescriptor`, `ReservedFunctionId`,
///   `UnknownFunction`, `ArityMismatch`, `UnknownPeer`, `InvalidConfig`) are
///   returned from `register`/`invoke`/`new` and abort that operation.
/// - **Network conditions** (`RuntimeDropped`, `LengthMismatch`,
///   `PayloadTooLarge`, `Protocol`) only ever show up on the receive path,
///   where the packet is dropped, logged and reported in a
///   [`ReceiveOutcome::Dropped`](crate::ReceiveOutcome::Dropped).
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// A descriptor with the same id, parameter count and role is already
    /// registered.
    #[error("{function_id} with {parameter_count} parameters is already registered as {role}")]
    DuplicateDescriptor {
        function_id: FunctionId,
        parameter_count: usize,
        role: Role,
    },

    /// Negative function ids belong to protocol control calls.
    #[error("{0} is reserved for protocol control calls")]
    ReservedFunctionId(FunctionId),

    /// No descriptor exists for this id and role.
    #[error("no function {function_id} registered as {role}")]
    UnknownFunction { function_id: FunctionId, role: Role },

    /// The caller passed a different number of parameters than the
    /// function was registered with.
    #[error("{function_id} expects {expected} parameters, got {actual}")]
    ArityMismatch {
        function_id: FunctionId,
        expected: usize,
        actual: usize,
    },

    /// The call was addressed to a peer that is not connected.
    #[error("{0} is not connected")]
    UnknownPeer(PeerId),

    /// The packet is shorter than the smallest possible envelope.
    #[error("packet of {len} bytes dropped, minimum envelope is {min} bytes")]
    RuntimeDropped { len: usize, min: usize },

    /// A reassembled transfer did not add up to its declared length.
    #[error("transfer {transfer_id}: expected {expected} bytes, reassembled {actual}")]
    LengthMismatch {
        transfer_id: TransferId,
        expected: u64,
        actual: u64,
    },

    /// A transfer declared more bytes than this node accepts.
    #[error("transfer {transfer_id} declares {declared} bytes, limit is {limit}")]
    PayloadTooLarge {
        transfer_id: TransferId,
        declared: u64,
        limit: u64,
    },

    /// The protocol configuration is unusable.
    #[error("invalid protocol config: {0}")]
    InvalidConfig(String),

    /// A codec or envelope error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
