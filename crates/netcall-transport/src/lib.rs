//! Transport abstraction layer for netcall.
//!
//! The RPC core never touches sockets. It hands byte buffers to a peer and
//! receives byte buffers from a peer; this crate defines what a "peer" is
//! ([`PeerId`]), how a buffer should be delivered ([`DeliveryPolicy`]), and
//! the async [`Connection`]/[`Transport`] traits that real network links
//! implement.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket links via `tokio-tungstenite`
//! - `memory` (default): in-process connection pairs for tests and demos

mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{memory_pair, MemoryConnection};
#[cfg(feature = "websocket")]
pub use websocket::{
    WebSocketClientConnection, WebSocketConnection, WebSocketServerConnection, WebSocketTransport,
};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter shared by every connection implementation in this crate, so a
/// process never hands out the same peer identity twice.
static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_peer_id() -> PeerId {
    PeerId::new(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Opaque identifier for the remote end of a connection.
///
/// This is the only notion of "who" that crosses into the RPC core. Handlers
/// see a `PeerId`, never a socket or a game object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    /// Creates a new `PeerId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// How a buffer should be delivered by the underlying link.
///
/// The RPC core treats this as an opaque tag: it is chosen by the caller of
/// `invoke` and passed through untouched to the connection. Only the
/// connection decides what each policy means on its wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryPolicy {
    /// Delivered in order, no loss.
    #[default]
    Reliable,

    /// Reliable, but must not be coalesced with neighbouring packets.
    ReliableNoMerge,

    /// Delivered, possibly out of order.
    ReliableUnordered,

    /// May be lost or reordered.
    Unreliable,
}

impl DeliveryPolicy {
    /// Returns `true` for every policy that guarantees delivery.
    pub fn is_reliable(self) -> bool {
        !matches!(self, Self::Unreliable)
    }
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reliable => write!(f, "Reliable"),
            Self::ReliableNoMerge => write!(f, "ReliableNoMerge"),
            Self::ReliableUnordered => write!(f, "ReliableUnordered"),
            Self::Unreliable => write!(f, "Unreliable"),
        }
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A single link to one remote peer that can send and receive byte buffers.
///
/// The returned futures are `Send` so a connection can be driven from a
/// spawned Tokio task regardless of its concrete type.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends data to the remote peer over a reliable channel.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next buffer from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Sends data over an unreliable channel.
    ///
    /// Defaults to reliable send. Links that support unreliable delivery
    /// should override this.
    fn send_unreliable(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.send(data)
    }

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the identity of the remote peer.
    fn id(&self) -> PeerId;
}
