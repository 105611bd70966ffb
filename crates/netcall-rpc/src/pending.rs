//! Transfers paused at the buffer ceiling, waiting for "continue transfer".

use std::collections::HashMap;

use netcall_protocol::TransferId;
use netcall_transport::PeerId;

use crate::OutgoingTransfer;

/// Paused outgoing transfers, keyed by destination peer and transfer id.
///
/// The same transfer id can be in flight to several peers at once (a
/// broadcast of a large call), each paused independently, so the peer is
/// part of the key.
#[derive(Debug, Default)]
pub struct PendingSendQueue {
    transfers: HashMap<(PeerId, TransferId), OutgoingTransfer>,
}

impl PendingSendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a paused transfer until its receiver asks to continue.
    ///
    /// Parking the same (peer, transfer) twice replaces the earlier entry.
    pub fn park(&mut self, transfer: OutgoingTransfer) {
        let key = (transfer.peer, transfer.transfer_id.clone());
        if self.transfers.insert(key, transfer).is_some() {
            tracing::warn!("paused transfer parked twice, keeping the newer one");
        }
    }

    /// Takes a parked transfer back out so emission can resume.
    ///
    /// Returns `None` for an unknown or already released transfer; a stray
    /// or repeated continue signal is harmless.
    pub fn release(&mut self, peer: PeerId, transfer_id: &TransferId) -> Option<OutgoingTransfer> {
        self.transfers.remove(&(peer, transfer_id.clone()))
    }

    /// Drops every transfer headed to `peer`. Returns how many were dropped.
    pub fn purge_peer(&mut self, peer: PeerId) -> usize {
        let before = self.transfers.len();
        self.transfers.retain(|(p, _), _| *p != peer);
        before - self.transfers.len()
    }

    /// Returns `true` if the transfer is parked.
    pub fn contains(&self, peer: PeerId, transfer_id: &TransferId) -> bool {
        self.transfers.contains_key(&(peer, transfer_id.clone()))
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
