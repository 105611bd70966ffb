//! `Node`: a [`ProtocolContext`] wired to live connections.
//!
//! The protocol core is synchronous; connections are async. A node bridges
//! the two the same way a game loop does:
//!
//! ```text
//! reader task per peer ──PeerEvent──→ mpsc ──→ tick() ──→ ProtocolContext
//!                                                │
//!                     Connection::send ←── outbox flush
//! ```
//!
//! Each attached connection gets a Tokio task that only reads and forwards
//! packets into a bounded channel. All protocol work happens inside
//! [`Node::tick`], on the caller's task, one batch at a time.

use std::collections::HashMap;
use std::sync::Arc;

use netcall_protocol::{FunctionId, NodeRole, Role, TransferId, Value};
use netcall_rpc::{
    FunctionRegistry, Outbox, PeerPurge, ProtocolConfig, ProtocolContext, ReceiveOutcome,
    Recipient,
};
use netcall_transport::{Connection, DeliveryPolicy, PeerId, Transport, TransportError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::NetcallError;

/// What reader tasks report back to the node.
#[derive(Debug)]
enum PeerEvent {
    Packet(PeerId, Vec<u8>),
    Closed(PeerId),
}

/// Configuration for a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Fragmentation, reassembly and backpressure settings.
    pub protocol: ProtocolConfig,

    /// Packets buffered between reader tasks and `tick`. When full, readers
    /// stop pulling from their sockets until the next tick drains it.
    ///
    /// Default: 1024.
    pub event_queue_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            event_queue_size: 1024,
        }
    }
}

/// Builder for a [`Node`].
///
/// # Example
///
/// ```rust,ignore
/// use netcall::prelude::*;
///
/// let mut registry = FunctionRegistry::new();
/// registry.register_handler(FunctionId(7), Role::Both, 1, |ctx, r| {
///     println!("{} says {}", ctx.peer, r.read_string()?);
///     Ok(())
/// })?;
///
/// let mut node = NodeBuilder::new(NodeRole::Server)
///     .registry(registry)
///     .build::<WebSocketServerConnection>()?;
/// ```
pub struct NodeBuilder {
    role: NodeRole,
    config: NodeConfig,
    registry: FunctionRegistry,
}

impl NodeBuilder {
    /// Starts a builder for a node playing `role`.
    pub fn new(role: NodeRole) -> Self {
        Self {
            role,
            config: NodeConfig::default(),
            registry: FunctionRegistry::new(),
        }
    }

    /// Sets the node configuration.
    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets only the protocol part of the configuration.
    pub fn protocol_config(mut self, config: ProtocolConfig) -> Self {
        self.config.protocol = config;
        self
    }

    /// Sets the functions this node can run.
    pub fn registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Builds the node.
    ///
    /// # Errors
    /// Fails if the protocol configuration is invalid or the event queue
    /// size is zero.
    pub fn build<C: Connection>(self) -> Result<Node<C>, NetcallError> {
        if self.config.event_queue_size == 0 {
            return Err(netcall_rpc::RpcError::InvalidConfig(
                "event_queue_size must be greater than 0".into(),
            )
            .into());
        }

        let context = ProtocolContext::new(self.role, self.config.protocol, self.registry)?;
        let (events_tx, events_rx) = mpsc::channel(self.config.event_queue_size);

        Ok(Node {
            context,
            connections: HashMap::new(),
            readers: HashMap::new(),
            events_tx,
            events_rx,
            outbox: Outbox::new(),
        })
    }
}

/// One participant in a session: protocol state plus its open connections.
pub struct Node<C: Connection> {
    context: ProtocolContext,
    connections: HashMap<PeerId, Arc<C>>,
    readers: HashMap<PeerId, JoinHandle<()>>,
    events_tx: mpsc::Sender<PeerEvent>,
    events_rx: mpsc::Receiver<PeerEvent>,
    outbox: Outbox,
}

impl<C: Connection> Node<C> {
    /// The protocol state, for introspection.
    pub fn context(&self) -> &ProtocolContext {
        &self.context
    }

    /// Connected peers in id order.
    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.context.peers()
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Takes ownership of a connection and starts reading from it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(&mut self, conn: C) -> PeerId {
        let peer = conn.id();
        let conn = Arc::new(conn);
        let reader = tokio::spawn(read_loop(peer, Arc::clone(&conn), self.events_tx.clone()));

        if let Some(old) = self.readers.insert(peer, reader) {
            old.abort();
        }
        self.connections.insert(peer, conn);
        self.context.connect_peer(peer);
        peer
    }

    /// Accepts the next connection from `transport` and attaches it.
    ///
    /// # Errors
    /// Returns the transport's accept error.
    pub async fn accept_from<T>(&mut self, transport: &mut T) -> Result<PeerId, NetcallError>
    where
        T: Transport<Connection = C, Error = TransportError>,
    {
        let conn = transport.accept().await?;
        Ok(self.attach(conn))
    }

    /// Closes and forgets a peer, dropping every transfer to or from it.
    pub async fn detach(&mut self, peer: PeerId) -> PeerPurge {
        if let Some(reader) = self.readers.remove(&peer) {
            reader.abort();
        }
        if let Some(conn) = self.connections.remove(&peer) {
            if let Err(e) = conn.close().await {
                tracing::debug!(%peer, error = %e, "close failed");
            }
        }
        self.context.disconnect_peer(peer)
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Queues a call. The packets go out on the next [`tick`](Self::tick)
    /// or [`flush`](Self::flush).
    ///
    /// # Errors
    /// See [`ProtocolContext::invoke`].
    pub fn invoke(
        &mut self,
        recipient: Recipient,
        function_id: FunctionId,
        role: Role,
        policy: DeliveryPolicy,
        params: &[Value],
    ) -> Result<TransferId, NetcallError> {
        let transfer_id =
            self.context
                .invoke(&mut self.outbox, recipient, function_id, role, policy, params)?;
        Ok(transfer_id)
    }

    /// Runs one protocol step: handles every packet that arrived since the
    /// last tick, then flushes everything queued for sending.
    ///
    /// Never fails. Bad packets are dropped inside the context and a peer
    /// whose connection fails is detached.
    pub async fn tick(&mut self) -> Vec<(PeerId, ReceiveOutcome)> {
        let mut outcomes = Vec::new();

        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                PeerEvent::Packet(peer, bytes) => {
                    if !self.connections.contains_key(&peer) {
                        continue;
                    }
                    let outcome = self.context.on_receive(&mut self.outbox, peer, &bytes);
                    outcomes.push((peer, outcome));
                }
                PeerEvent::Closed(peer) => {
                    if self.connections.contains_key(&peer) {
                        self.detach(peer).await;
                    }
                }
            }
        }

        self.flush().await;
        outcomes
    }

    /// Writes every queued packet to its connection. Returns how many were
    /// sent.
    pub async fn flush(&mut self) -> usize {
        let mut sent = 0;

        for packet in self.outbox.take() {
            let Some(conn) = self.connections.get(&packet.peer).cloned() else {
                continue;
            };

            let result = match packet.policy {
                DeliveryPolicy::Unreliable => conn.send_unreliable(&packet.bytes).await,
                _ => conn.send(&packet.bytes).await,
            };

            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(peer = %packet.peer, error = %e, "send failed, detaching peer");
                    self.detach(packet.peer).await;
                }
            }
        }

        sent
    }
}

impl<C: Connection> Drop for Node<C> {
    fn drop(&mut self) {
        for reader in self.readers.values() {
            reader.abort();
        }
    }
}

/// Forwards everything `conn` receives to the node until it closes.
async fn read_loop<C: Connection>(peer: PeerId, conn: Arc<C>, events: mpsc::Sender<PeerEvent>) {
    loop {
        match conn.recv().await {
            Ok(Some(bytes)) => {
                if events.send(PeerEvent::Packet(peer, bytes)).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                tracing::debug!(%peer, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::debug!(%peer, error = %e, "recv error");
                break;
            }
        }
    }

    let _ = events.send(PeerEvent::Closed(peer)).await;
}
