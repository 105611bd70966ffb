//! # netcall
//!
//! Peer-to-peer remote function calls for multiplayer games.
//!
//! Game code registers numbered functions, then calls them on other peers
//! with a list of parameters. Small calls travel as a single packet; large
//! ones are compressed, split into chunks and reassembled on the other side
//! with a per-transfer in-flight ceiling, so a multi-megabyte call never
//! floods a link.
//!
//! The workspace is layered:
//!
//! | Crate | What it does |
//! |-------|--------------|
//! | `netcall-transport` | peers, delivery policies, WebSocket and in-memory links |
//! | `netcall-protocol` | wire codec, envelopes, LZ4 chunk compression |
//! | `netcall-rpc` | registry, fragmentation, reassembly, dispatch |
//! | `netcall` | [`Node`], the async glue, and one error type |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netcall::prelude::*;
//!
//! # async fn run() -> Result<(), NetcallError> {
//! let mut registry = FunctionRegistry::new();
//! registry.register_handler(FunctionId(7), Role::Both, 2, |ctx, r| {
//!     let text = r.read_string()?;
//!     let number = r.read_i32()?;
//!     tracing::info!(peer = %ctx.peer, %text, number, "greeted");
//!     Ok(())
//! })?;
//!
//! let (a, _b) = memory_pair();
//! let mut node = NodeBuilder::new(NodeRole::Client)
//!     .registry(registry)
//!     .build::<MemoryConnection>()?;
//! let server = node.attach(a);
//!
//! node.invoke(
//!     Recipient::Peer(server),
//!     FunctionId(7),
//!     Role::Both,
//!     DeliveryPolicy::Reliable,
//!     &["hello".into(), 42i32.into()],
//! )?;
//! node.tick().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod node;

pub use error::NetcallError;
pub use node::{Node, NodeBuilder, NodeConfig};

pub use netcall_protocol as protocol;
pub use netcall_rpc as rpc;
pub use netcall_transport as transport;

/// Everything a typical game needs, in one import.
pub mod prelude {
    pub use crate::{NetcallError, Node, NodeBuilder, NodeConfig};
    pub use netcall_protocol::{FunctionId, NodeRole, Reader, Role, TransferId, Value};
    pub use netcall_rpc::{
        CallContext, FunctionRegistry, ProtocolConfig, ReceiveOutcome, Recipient,
    };
    pub use netcall_transport::{
        memory_pair, Connection, DeliveryPolicy, MemoryConnection, PeerId, Transport,
    };
    #[cfg(feature = "websocket")]
    pub use netcall_transport::{
        WebSocketClientConnection, WebSocketConnection, WebSocketServerConnection,
        WebSocketTransport,
    };
}
