//! In-process connection pairs.
//!
//! Two [`MemoryConnection`]s returned by [`memory_pair`] are wired
//! back-to-back: whatever one sends, the other receives, in order. Dropping
//! or closing either end makes the other end's `recv` return `Ok(None)`.

use tokio::sync::{mpsc, Mutex};

use crate::{next_peer_id, Connection, PeerId, TransportError};

/// One end of an in-memory link.
pub struct MemoryConnection {
    /// Identity of the *remote* end, as seen from this side.
    id: PeerId,
    /// `None` once this end has been closed.
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

/// Creates two connected in-memory endpoints.
///
/// Each endpoint reports the *other* side's identity from
/// [`Connection::id`], mirroring how a socket-backed connection identifies
/// its remote peer.
pub fn memory_pair() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let a_id = next_peer_id();
    let b_id = next_peer_id();

    let a = MemoryConnection {
        id: b_id,
        tx: std::sync::Mutex::new(Some(a_tx)),
        rx: Mutex::new(a_rx),
    };
    let b = MemoryConnection {
        id: a_id,
        tx: std::sync::Mutex::new(Some(b_tx)),
        rx: Mutex::new(b_rx),
    };
    (a, b)
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let closed = || TransportError::ConnectionClosed(self.id);
        let guard = self.tx.lock().map_err(|_| closed())?;
        let tx = guard.as_ref().ok_or_else(closed)?;
        tx.send(data.to_vec()).map_err(|_| closed())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        // Dropping the sender ends the remote side's stream.
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        Ok(())
    }

    fn id(&self) -> PeerId {
        self.id
    }
}
