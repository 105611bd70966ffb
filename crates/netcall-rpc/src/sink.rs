//! Where outgoing packets go, and who they go to.
//!
//! The RPC core is synchronous and never performs I/O. Everything it wants
//! to send is handed to a [`PacketSink`]; the host drains that (usually an
//! [`Outbox`]) into real connections after the tick.

use netcall_transport::{DeliveryPolicy, PeerId};

/// Receives packets produced by the RPC core.
pub trait PacketSink {
    /// Queues one packet for `peer`.
    fn send(&mut self, peer: PeerId, policy: DeliveryPolicy, packet: Vec<u8>);
}

/// A packet waiting to be written to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPacket {
    pub peer: PeerId,
    pub policy: DeliveryPolicy,
    pub bytes: Vec<u8>,
}

/// A plain FIFO [`PacketSink`].
#[derive(Debug, Default)]
pub struct Outbox {
    packets: Vec<OutgoingPacket>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Borrows the queued packets in send order.
    pub fn packets(&self) -> &[OutgoingPacket] {
        &self.packets
    }

    /// Removes and returns every queued packet, in send order.
    pub fn take(&mut self) -> Vec<OutgoingPacket> {
        std::mem::take(&mut self.packets)
    }
}

impl PacketSink for Outbox {
    fn send(&mut self, peer: PeerId, policy: DeliveryPolicy, packet: Vec<u8>) {
        self.packets.push(OutgoingPacket {
            peer,
            policy,
            bytes: packet,
        });
    }
}

/// Who an invoked call is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// One specific connected peer.
    Peer(PeerId),
    /// Every connected peer.
    All,
    /// Every connected peer except one.
    AllExcept(PeerId),
}
