//! The dispatcher: one object that owns every piece of protocol state.
//!
//! A [`ProtocolContext`] is created once per node and driven from a single
//! tick loop. It never blocks and never touches a socket. Incoming packets
//! are fed to [`on_receive`](ProtocolContext::on_receive); outgoing packets
//! (calls, chunks and continue signals) are written into whatever
//! [`PacketSink`] the caller passes in.
//!
//! # Receive path
//!
//! ```text
//! packet ─→ length check ─→ Envelope::decode
//!             ├─ Whole ───────────────────────────→ dispatch
//!             └─ Chunk ─→ Reassembler ─ complete ─→ dispatch
//!                                     └ pending ──→ maybe send "continue"
//! dispatch: CONTINUE_TRANSFER → resume paused send
//!           otherwise         → registry.find(id, count, node role) → handler
//! ```
//!
//! Every receive-path failure is logged and returned as
//! [`ReceiveOutcome::Dropped`]; nothing here can stop the tick loop.

use std::collections::BTreeSet;

use netcall_protocol::{
    encode_call, open_call, Envelope, FunctionId, NodeRole, ProtocolError, Role, TransferId,
    Value, WholeEnvelope, MIN_ENVELOPE_LEN,
};
use netcall_transport::{DeliveryPolicy, PeerId};

use crate::{
    CallContext, ChunkOutcome, EmitOutcome, Fragmenter, Fragments, FunctionRegistry,
    OutgoingTransfer, PacketSink, PendingSendQueue, ProtocolConfig, Reassembler, Recipient,
    RpcError,
};

/// Reserved id of the "continue transfer" control call. Its single string
/// parameter is the id of the paused transfer.
pub const CONTINUE_TRANSFER: FunctionId = FunctionId(-1);

/// What [`ProtocolContext::on_receive`] did with a packet.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// A handler ran.
    Dispatched { function_id: FunctionId },
    /// A chunk was stored; the transfer is not complete yet.
    Buffered {
        transfer_id: TransferId,
        requested_continue: bool,
    },
    /// A continue signal released a paused send.
    Resumed { transfer_id: TransferId },
    /// No handler matches on this node. Normal for broadcast traffic.
    NoHandler { function_id: FunctionId },
    /// A repeated final chunk or continue signal. Ignored.
    Duplicate,
    /// The packet was discarded.
    Dropped(RpcError),
}

/// State released when a peer disconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerPurge {
    /// Incoming transfers that were still missing chunks.
    pub partial_transfers: usize,
    /// Outgoing transfers that were waiting for a continue signal.
    pub paused_sends: usize,
}

/// Per-node protocol state: registry, fragmenter, pending sends,
/// reassembly buffers and the connected-peer set.
#[derive(Debug)]
pub struct ProtocolContext {
    config: ProtocolConfig,
    node_role: NodeRole,
    registry: FunctionRegistry,
    fragmenter: Fragmenter,
    pending_sends: PendingSendQueue,
    reassembler: Reassembler,
    peers: BTreeSet<PeerId>,
}

impl ProtocolContext {
    /// Creates a context for a node playing `node_role`.
    ///
    /// # Errors
    /// Returns [`RpcError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        node_role: NodeRole,
        config: ProtocolConfig,
        registry: FunctionRegistry,
    ) -> Result<Self, RpcError> {
        config.validate()?;
        Ok(Self {
            fragmenter: Fragmenter::new(&config),
            reassembler: Reassembler::new(&config),
            pending_sends: PendingSendQueue::new(),
            peers: BTreeSet::new(),
            config,
            node_role,
            registry,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn node_role(&self) -> NodeRole {
        self.node_role
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Peer lifecycle
    // -----------------------------------------------------------------------

    /// Marks `peer` as connected. Returns `false` if it already was.
    pub fn connect_peer(&mut self, peer: PeerId) -> bool {
        let added = self.peers.insert(peer);
        if added {
            tracing::info!(%peer, peers = self.peers.len(), "peer connected");
        }
        added
    }

    /// Forgets `peer` and drops every transfer to or from it.
    pub fn disconnect_peer(&mut self, peer: PeerId) -> PeerPurge {
        if !self.peers.remove(&peer) {
            return PeerPurge::default();
        }

        let purge = PeerPurge {
            partial_transfers: self.reassembler.purge_peer(peer),
            paused_sends: self.pending_sends.purge_peer(peer),
        };
        tracing::info!(
            %peer,
            partial_transfers = purge.partial_transfers,
            paused_sends = purge.paused_sends,
            "peer disconnected"
        );
        purge
    }

    /// Connected peers in id order.
    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.iter().copied()
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.peers.contains(&peer)
    }

    /// Incoming transfers still being reassembled.
    pub fn pending_transfer_count(&self) -> usize {
        self.reassembler.len()
    }

    /// Outgoing transfers paused at the buffer ceiling.
    pub fn paused_send_count(&self) -> usize {
        self.pending_sends.len()
    }

    // -----------------------------------------------------------------------
    // Send path
    // -----------------------------------------------------------------------

    /// Encodes a call and sends it to `recipient`.
    ///
    /// `role` names which registration of `function_id` is being called;
    /// its parameter count is checked against `params`. Returns the
    /// transfer id shared by every packet of the call.
    ///
    /// A large call is compressed once; each recipient then gets its own
    /// chunk stream, which may pause independently.
    ///
    /// # Errors
    /// - [`RpcError::ReservedFunctionId`] for negative ids
    /// - [`RpcError::UnknownFunction`] if nothing is registered for
    ///   `function_id` with `role`
    /// - [`RpcError::ArityMismatch`] if `params` has the wrong length
    /// - [`RpcError::UnknownPeer`] if a single recipient is not connected
    /// - [`RpcError::Protocol`] if a parameter cannot be encoded
    pub fn invoke<S: PacketSink>(
        &mut self,
        sink: &mut S,
        recipient: Recipient,
        function_id: FunctionId,
        role: Role,
        policy: DeliveryPolicy,
        params: &[Value],
    ) -> Result<TransferId, RpcError> {
        if function_id.is_reserved() {
            return Err(RpcError::ReservedFunctionId(function_id));
        }

        let mut counts = self
            .registry
            .with_role(function_id, role)
            .map(|d| d.parameter_count)
            .peekable();
        let Some(&expected) = counts.peek() else {
            return Err(RpcError::UnknownFunction { function_id, role });
        };
        if !counts.any(|count| count == params.len()) {
            return Err(RpcError::ArityMismatch {
                function_id,
                expected,
                actual: params.len(),
            });
        }

        let peers = self.resolve(recipient)?;
        let transfer_id = TransferId::generate();
        let body = encode_call(params)?;

        match self.fragmenter.fragment(function_id, transfer_id.clone(), body) {
            Fragments::Whole(envelope) => {
                let packet = envelope.encode()?;
                for &peer in &peers {
                    sink.send(peer, policy, packet.clone());
                }
            }
            Fragments::Chunked(plan) => {
                for &peer in &peers {
                    let mut transfer = OutgoingTransfer::new(
                        peer,
                        policy,
                        role,
                        function_id,
                        transfer_id.clone(),
                        plan.clone(),
                    );
                    if let EmitOutcome::Paused { .. } = self.fragmenter.emit(&mut transfer, sink)? {
                        self.pending_sends.park(transfer);
                    }
                }
            }
        }

        tracing::debug!(
            %function_id,
            %transfer_id,
            %policy,
            recipients = peers.len(),
            "call invoked"
        );
        Ok(transfer_id)
    }

    fn resolve(&self, recipient: Recipient) -> Result<Vec<PeerId>, RpcError> {
        match recipient {
            Recipient::Peer(peer) if self.peers.contains(&peer) => Ok(vec![peer]),
            Recipient::Peer(peer) => Err(RpcError::UnknownPeer(peer)),
            Recipient::All => Ok(self.peers().collect()),
            Recipient::AllExcept(skip) => Ok(self.peers().filter(|&p| p != skip).collect()),
        }
    }

    fn send_continue<S: PacketSink>(
        &self,
        sink: &mut S,
        peer: PeerId,
        transfer_id: &TransferId,
    ) -> Result<(), ProtocolError> {
        let payload = encode_call(&[Value::from(transfer_id.as_str())])?;
        let packet = Envelope::Whole(WholeEnvelope {
            function_id: CONTINUE_TRANSFER,
            transfer_id: TransferId::generate(),
            payload,
        })
        .encode()?;
        sink.send(peer, DeliveryPolicy::Reliable, packet);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Receive path
    // -----------------------------------------------------------------------

    /// Handles one packet from `peer`.
    ///
    /// Any packets this provokes (a continue signal, resumed chunks) are
    /// written into `sink`.
    pub fn on_receive<S: PacketSink>(
        &mut self,
        sink: &mut S,
        peer: PeerId,
        packet: &[u8],
    ) -> ReceiveOutcome {
        match self.receive(sink, peer, packet) {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    RpcError::RuntimeDropped { .. } | RpcError::UnknownPeer(_) => {
                        tracing::debug!(%peer, error = %e, "packet dropped");
                    }
                    _ => tracing::warn!(%peer, error = %e, "packet dropped"),
                }
                ReceiveOutcome::Dropped(e)
            }
        }
    }

    fn receive<S: PacketSink>(
        &mut self,
        sink: &mut S,
        peer: PeerId,
        packet: &[u8],
    ) -> Result<ReceiveOutcome, RpcError> {
        if packet.len() < MIN_ENVELOPE_LEN {
            return Err(RpcError::RuntimeDropped {
                len: packet.len(),
                min: MIN_ENVELOPE_LEN,
            });
        }
        if !self.peers.contains(&peer) {
            return Err(RpcError::UnknownPeer(peer));
        }

        match Envelope::decode(packet)? {
            Envelope::Whole(whole) => {
                self.dispatch(sink, peer, whole.function_id, whole.transfer_id, &whole.payload)
            }
            Envelope::Chunk(chunk) => {
                let transfer_id = chunk.transfer_id.clone();
                match self.reassembler.accept(peer, chunk)? {
                    ChunkOutcome::Pending { request_continue } => {
                        if request_continue {
                            self.send_continue(sink, peer, &transfer_id)?;
                        }
                        Ok(ReceiveOutcome::Buffered {
                            transfer_id,
                            requested_continue: request_continue,
                        })
                    }
                    ChunkOutcome::Complete {
                        function_id,
                        transfer_id,
                        body,
                    } => self.dispatch(sink, peer, function_id, transfer_id, &body),
                    ChunkOutcome::Duplicate => Ok(ReceiveOutcome::Duplicate),
                }
            }
        }
    }

    fn dispatch<S: PacketSink>(
        &mut self,
        sink: &mut S,
        peer: PeerId,
        function_id: FunctionId,
        transfer_id: TransferId,
        body: &[u8],
    ) -> Result<ReceiveOutcome, RpcError> {
        let (count, mut params) = open_call(body)?;

        if function_id == CONTINUE_TRANSFER {
            if count != 1 {
                return Err(RpcError::ArityMismatch {
                    function_id,
                    expected: 1,
                    actual: count,
                });
            }
            let paused = TransferId::new(params.read_string()?);
            return self.resume(sink, peer, paused);
        }

        let Some(descriptor) = self.registry.find(function_id, count, self.node_role) else {
            tracing::trace!(%peer, %function_id, count, "no handler for call");
            return Ok(ReceiveOutcome::NoHandler { function_id });
        };

        let ctx = CallContext {
            peer,
            function_id,
            transfer_id,
        };
        (descriptor.handler)(&ctx, &mut params)?;

        tracing::trace!(%peer, %function_id, "call dispatched");
        Ok(ReceiveOutcome::Dispatched { function_id })
    }

    fn resume<S: PacketSink>(
        &mut self,
        sink: &mut S,
        peer: PeerId,
        transfer_id: TransferId,
    ) -> Result<ReceiveOutcome, RpcError> {
        let Some(mut transfer) = self.pending_sends.release(peer, &transfer_id) else {
            tracing::debug!(%peer, %transfer_id, "continue for unknown transfer ignored");
            return Ok(ReceiveOutcome::Duplicate);
        };

        tracing::debug!(
            %peer,
            %transfer_id,
            remaining = transfer.remaining_chunks(),
            "transfer resumed"
        );
        if let EmitOutcome::Paused { .. } = self.fragmenter.emit(&mut transfer, sink)? {
            self.pending_sends.park(transfer);
        }
        Ok(ReceiveOutcome::Resumed { transfer_id })
    }
}
