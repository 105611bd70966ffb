//! Unified error type for netcall.

use netcall_protocol::ProtocolError;
use netcall_rpc::RpcError;
use netcall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `netcall` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum NetcallError {
    /// A transport-level error (connect, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, decompress).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An RPC-level error (registration, invoke, config).
    #[error(transparent)]
    Rpc(#[from] RpcError),
}
