//! Receiver side of fragmentation.
//!
//! Chunks are decompressed as they arrive and appended to a per-transfer
//! buffer. When the chunk with `remaining_chunks == 0` lands, the buffer is
//! checked against the declared total and handed back as a complete call
//! body.
//!
//! # Transfer keys
//!
//! Transfers are keyed by `(PeerId, TransferId)`. Transfer ids are random,
//! but a peer chooses its own, so two peers could in principle pick the
//! same one; keying by peer keeps their buffers apart and lets a disconnect
//! drop exactly that peer's state.
//!
//! # Continue signals
//!
//! The receiver asks the sender to continue whenever a non-final chunk
//! moves the transfer's cumulative compressed size into a new
//! `max_buffer_size` window. That is the same test the sender uses to
//! pause, see [`crosses_ceiling`].

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

use netcall_protocol::{decompress_chunk, ChunkEnvelope, FunctionId, TransferId};
use netcall_transport::PeerId;

use crate::{crosses_ceiling, ProtocolConfig, RpcError};

type TransferKey = (PeerId, TransferId);

/// One call being put back together.
#[derive(Debug)]
struct Transfer {
    function_id: FunctionId,
    expected_total: u64,
    buffer: Vec<u8>,
}

/// What happened to one accepted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// More chunks are expected. If `request_continue` is set the sender
    /// has paused and is waiting for a continue signal.
    Pending { request_continue: bool },
    /// The call is fully reassembled.
    Complete {
        function_id: FunctionId,
        transfer_id: TransferId,
        body: Vec<u8>,
    },
    /// A chunk of a transfer that already completed. Ignored.
    Duplicate,
}

/// Bounded FIFO memory of finished transfers.
#[derive(Debug)]
struct RecentlyCompleted {
    capacity: usize,
    order: VecDeque<TransferKey>,
    keys: HashSet<TransferKey>,
}

impl RecentlyCompleted {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            keys: HashSet::new(),
        }
    }

    fn contains(&self, key: &TransferKey) -> bool {
        self.keys.contains(key)
    }

    fn insert(&mut self, key: TransferKey) {
        if self.capacity == 0 || !self.keys.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }

    fn purge_peer(&mut self, peer: PeerId) {
        self.order.retain(|(p, _)| *p != peer);
        self.keys.retain(|(p, _)| *p != peer);
    }
}

/// Reassembles chunked calls from every connected peer.
#[derive(Debug)]
pub struct Reassembler {
    transfers: HashMap<TransferKey, Transfer>,
    completed: RecentlyCompleted,
    max_buffer_size: u64,
    max_payload_len: u64,
}

impl Reassembler {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            transfers: HashMap::new(),
            completed: RecentlyCompleted::new(config.completed_cache_capacity),
            max_buffer_size: config.max_buffer_size as u64,
            max_payload_len: config.max_payload_len as u64,
        }
    }

    /// Feeds one chunk from `peer`.
    ///
    /// Any error drops the whole transfer; later chunks with the same id
    /// start over as an orphaned transfer and will fail the length check.
    ///
    /// # Errors
    /// - [`RpcError::PayloadTooLarge`] if the declared total exceeds
    ///   `max_payload_len`
    /// - [`RpcError::LengthMismatch`] if the declared total changes
    ///   mid-transfer, or the reassembled body does not match it
    /// - [`RpcError::Protocol`] if a chunk does not decompress, or would
    ///   decompress past the declared total
    pub fn accept(
        &mut self,
        peer: PeerId,
        chunk: ChunkEnvelope,
    ) -> Result<ChunkOutcome, RpcError> {
        let key = (peer, chunk.transfer_id.clone());

        if self.completed.contains(&key) && !self.transfers.contains_key(&key) {
            tracing::debug!(
                %peer,
                transfer_id = %chunk.transfer_id,
                "chunk for completed transfer ignored"
            );
            return Ok(ChunkOutcome::Duplicate);
        }

        if chunk.total_payload_len > self.max_payload_len {
            self.transfers.remove(&key);
            return Err(RpcError::PayloadTooLarge {
                transfer_id: chunk.transfer_id,
                declared: chunk.total_payload_len,
                limit: self.max_payload_len,
            });
        }

        let transfer = match self.transfers.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if !chunk.is_first() {
                    tracing::warn!(
                        %peer,
                        transfer_id = %chunk.transfer_id,
                        cumulative_bytes = chunk.cumulative_bytes,
                        "chunk without a start, treating as a new transfer"
                    );
                }
                entry.insert(Transfer {
                    function_id: chunk.function_id,
                    expected_total: chunk.total_payload_len,
                    buffer: Vec::new(),
                })
            }
        };

        if transfer.expected_total != chunk.total_payload_len {
            let expected = transfer.expected_total;
            self.transfers.remove(&key);
            return Err(RpcError::LengthMismatch {
                transfer_id: chunk.transfer_id,
                expected,
                actual: chunk.total_payload_len,
            });
        }

        let room = transfer.expected_total - transfer.buffer.len() as u64;
        let room = usize::try_from(room).unwrap_or(usize::MAX);
        let data = match decompress_chunk(&chunk.data, room) {
            Ok(data) => data,
            Err(e) => {
                self.transfers.remove(&key);
                return Err(e.into());
            }
        };
        transfer.buffer.extend_from_slice(&data);

        if !chunk.is_last() {
            let request_continue = crosses_ceiling(
                chunk.bytes_before(),
                chunk.cumulative_bytes,
                self.max_buffer_size,
            );
            tracing::trace!(
                %peer,
                transfer_id = %chunk.transfer_id,
                received = transfer.buffer.len(),
                remaining_chunks = chunk.remaining_chunks,
                request_continue,
                "chunk buffered"
            );
            return Ok(ChunkOutcome::Pending { request_continue });
        }

        let Some(transfer) = self.transfers.remove(&key) else {
            return Ok(ChunkOutcome::Duplicate);
        };
        let actual = transfer.buffer.len() as u64;
        if actual != transfer.expected_total {
            return Err(RpcError::LengthMismatch {
                transfer_id: chunk.transfer_id,
                expected: transfer.expected_total,
                actual,
            });
        }

        self.completed.insert(key);
        tracing::debug!(
            %peer,
            transfer_id = %chunk.transfer_id,
            body_len = actual,
            "transfer reassembled"
        );
        Ok(ChunkOutcome::Complete {
            function_id: transfer.function_id,
            transfer_id: chunk.transfer_id,
            body: transfer.buffer,
        })
    }

    /// Drops every partial transfer from `peer`. Returns how many were
    /// dropped.
    pub fn purge_peer(&mut self, peer: PeerId) -> usize {
        let before = self.transfers.len();
        self.transfers.retain(|(p, _), _| *p != peer);
        self.completed.purge_peer(peer);
        before - self.transfers.len()
    }

    /// Number of transfers still waiting for chunks.
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmitOutcome, Fragmenter, Fragments, OutgoingTransfer, Outbox};
    use netcall_protocol::{compress_chunk, Envelope, ProtocolError, Role};
    use netcall_transport::DeliveryPolicy;

    fn config(split_threshold: usize, max_buffer_size: usize) -> ProtocolConfig {
        ProtocolConfig {
            split_threshold,
            max_buffer_size,
            ..ProtocolConfig::default()
        }
    }

    fn noise(len: usize) -> Vec<u8> {
        use rand::RngCore;
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Fragments `body` and emits every chunk, resuming through pauses.
    /// Returns the chunks and how many times the sender paused.
    fn chunks_for(config: &ProtocolConfig, id: &str, body: Vec<u8>) -> (Vec<ChunkEnvelope>, usize) {
        let frag = Fragmenter::new(config);
        let Fragments::Chunked(plan) = frag.fragment(FunctionId(9), TransferId::new(id), body)
        else {
            panic!("body should need chunking");
        };
        let mut transfer = OutgoingTransfer::new(
            PeerId::new(1),
            DeliveryPolicy::Reliable,
            Role::Both,
            FunctionId(9),
            TransferId::new(id),
            plan,
        );
        let mut outbox = Outbox::new();
        let mut pauses = 0;
        while let EmitOutcome::Paused { .. } = frag.emit(&mut transfer, &mut outbox).unwrap() {
            pauses += 1;
        }

        let chunks = outbox
            .take()
            .into_iter()
            .map(|p| match Envelope::decode(&p.bytes).unwrap() {
                Envelope::Chunk(c) => c,
                Envelope::Whole(_) => panic!("expected a chunk"),
            })
            .collect();
        (chunks, pauses)
    }

    /// A one-chunk transfer carrying `raw` but declaring `total`.
    fn lone_chunk(id: &str, total: u64, raw: &[u8]) -> ChunkEnvelope {
        let data = compress_chunk(raw);
        ChunkEnvelope {
            function_id: FunctionId(9),
            total_payload_len: total,
            transfer_id: TransferId::new(id),
            remaining_chunks: 0,
            cumulative_bytes: data.len() as u64,
            data,
        }
    }

    fn feed_all(
        reassembler: &mut Reassembler,
        peer: PeerId,
        chunks: Vec<ChunkEnvelope>,
    ) -> Vec<ChunkOutcome> {
        chunks
            .into_iter()
            .map(|c| reassembler.accept(peer, c).unwrap())
            .collect()
    }

    // =====================================================================
    // accept(): happy path
    // =====================================================================

    #[test]
    fn test_accept_in_order_chunks_returns_original_body() {
        let config = config(100, 1_000_000);
        let body: Vec<u8> = (0..1000).map(|i| (i % 7) as u8).collect();
        let (chunks, _) = chunks_for(&config, "t", body.clone());
        let mut reassembler = Reassembler::new(&config);

        let outcomes = feed_all(&mut reassembler, PeerId::new(1), chunks);
        match outcomes.last() {
            Some(ChunkOutcome::Complete {
                function_id,
                body: restored,
                ..
            }) => {
                assert_eq!(*function_id, FunctionId(9));
                assert_eq!(*restored, body);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(reassembler.is_empty());
    }

    #[test]
    fn test_accept_requests_continue_once_per_sender_pause() {
        let config = config(100, 250);
        let (chunks, pauses) = chunks_for(&config, "t", noise(1200));
        assert!(pauses >= 2);
        let mut reassembler = Reassembler::new(&config);

        let outcomes = feed_all(&mut reassembler, PeerId::new(1), chunks);
        let continues = outcomes
            .iter()
            .filter(|o| matches!(o, ChunkOutcome::Pending { request_continue: true }))
            .count();
        assert_eq!(continues, pauses);
    }

    #[test]
    fn test_accept_keeps_peers_apart_with_same_transfer_id() {
        let config = config(100, 1_000_000);
        let (a, _) = chunks_for(&config, "same", vec![1u8; 300]);
        let (b, _) = chunks_for(&config, "same", vec![2u8; 300]);
        let mut reassembler = Reassembler::new(&config);

        let mut done = Vec::new();
        for (ca, cb) in a.into_iter().zip(b) {
            for (peer, chunk) in [(PeerId::new(1), ca), (PeerId::new(2), cb)] {
                if let ChunkOutcome::Complete { body, .. } = reassembler.accept(peer, chunk).unwrap() {
                    done.push((peer, body));
                }
            }
        }

        assert_eq!(done.len(), 2);
        assert_eq!(done[0], (PeerId::new(1), vec![1u8; 300]));
        assert_eq!(done[1], (PeerId::new(2), vec![2u8; 300]));
    }

    // =====================================================================
    // accept(): duplicates and orphans
    // =====================================================================

    #[test]
    fn test_accept_duplicate_final_chunk_is_ignored() {
        let config = config(100, 1_000_000);
        let chunk = lone_chunk("t", 5, b"hello");
        let mut reassembler = Reassembler::new(&config);

        let first = reassembler.accept(PeerId::new(1), chunk.clone()).unwrap();
        assert!(matches!(first, ChunkOutcome::Complete { .. }));

        let second = reassembler.accept(PeerId::new(1), chunk).unwrap();
        assert_eq!(second, ChunkOutcome::Duplicate);
        assert!(reassembler.is_empty());
    }

    #[test]
    fn test_accept_duplicate_check_disabled_completes_again() {
        let config = ProtocolConfig {
            completed_cache_capacity: 0,
            ..config(100, 1_000_000)
        };
        let chunk = lone_chunk("t", 5, b"hello");
        let mut reassembler = Reassembler::new(&config);

        reassembler.accept(PeerId::new(1), chunk.clone()).unwrap();
        let second = reassembler.accept(PeerId::new(1), chunk).unwrap();
        assert!(matches!(second, ChunkOutcome::Complete { .. }));
    }

    #[test]
    fn test_completed_cache_evicts_oldest() {
        let mut cache = RecentlyCompleted::new(2);
        let key = |id: &str| (PeerId::new(1), TransferId::new(id));
        cache.insert(key("a"));
        cache.insert(key("b"));
        cache.insert(key("c"));

        assert!(!cache.contains(&key("a")));
        assert!(cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
    }

    #[test]
    fn test_accept_orphan_continuation_starts_fresh_transfer() {
        let config = config(100, 1_000_000);
        let mut chunk = lone_chunk("t", 5, b"hello");
        // Claims earlier chunks were sent that we never saw.
        chunk.cumulative_bytes += 500;
        let mut reassembler = Reassembler::new(&config);

        let outcome = reassembler.accept(PeerId::new(1), chunk).unwrap();
        assert!(matches!(outcome, ChunkOutcome::Complete { .. }));
    }

    // =====================================================================
    // accept(): errors
    // =====================================================================

    #[test]
    fn test_accept_declared_total_over_limit_is_rejected() {
        let config = ProtocolConfig {
            max_payload_len: 1000,
            ..config(100, 1_000_000)
        };
        let mut reassembler = Reassembler::new(&config);

        let result = reassembler.accept(PeerId::new(1), lone_chunk("t", 1001, b"x"));
        assert!(matches!(
            result,
            Err(RpcError::PayloadTooLarge {
                declared: 1001,
                limit: 1000,
                ..
            })
        ));
        assert!(reassembler.is_empty());
    }

    #[test]
    fn test_accept_short_final_body_is_length_mismatch() {
        let mut reassembler = Reassembler::new(&config(100, 1_000_000));

        let result = reassembler.accept(PeerId::new(1), lone_chunk("t", 10, b"hello"));
        assert!(matches!(
            result,
            Err(RpcError::LengthMismatch {
                expected: 10,
                actual: 5,
                ..
            })
        ));
        assert!(reassembler.is_empty());
    }

    #[test]
    fn test_accept_chunk_past_declared_total_drops_transfer() {
        let mut reassembler = Reassembler::new(&config(100, 1_000_000));

        let result = reassembler.accept(PeerId::new(1), lone_chunk("t", 3, b"hello"));
        assert!(matches!(result, Err(RpcError::Protocol(_))));
        assert!(reassembler.is_empty());
    }

    #[test]
    fn test_accept_changed_total_mid_transfer_is_length_mismatch() {
        let config = config(100, 1_000_000);
        let (mut chunks, _) = chunks_for(&config, "t", vec![7u8; 300]);
        let mut reassembler = Reassembler::new(&config);

        reassembler.accept(PeerId::new(1), chunks.remove(0)).unwrap();
        let mut second = chunks.remove(0);
        second.total_payload_len = 301;

        let result = reassembler.accept(PeerId::new(1), second);
        assert!(matches!(
            result,
            Err(RpcError::LengthMismatch {
                expected: 300,
                actual: 301,
                ..
            })
        ));
        assert!(reassembler.is_empty());
    }

    #[test]
    fn test_accept_corrupt_chunk_drops_transfer() {
        let config = config(100, 1_000_000);
        let (mut chunks, _) = chunks_for(&config, "t", vec![7u8; 300]);
        let mut reassembler = Reassembler::new(&config);

        reassembler.accept(PeerId::new(1), chunks.remove(0)).unwrap();
        assert_eq!(reassembler.len(), 1);

        let mut broken = chunks.remove(0);
        broken.data.truncate(2);
        assert!(reassembler.accept(PeerId::new(1), broken).is_err());
        assert!(reassembler.is_empty());
    }

    #[test]
    fn test_accept_chunk_cut_inside_block_drops_transfer() {
        let config = config(100, 1_000_000);
        let (mut chunks, _) = chunks_for(&config, "t", noise(300));
        let mut reassembler = Reassembler::new(&config);

        reassembler.accept(PeerId::new(1), chunks.remove(0)).unwrap();

        let mut broken = chunks.remove(0);
        broken.data.truncate(50);
        let result = reassembler.accept(PeerId::new(1), broken);
        assert!(matches!(result, Err(RpcError::Protocol(ProtocolError::Decompress(_)))));
        assert!(reassembler.is_empty());
    }

    // =====================================================================
    // purge_peer()
    // =====================================================================

    #[test]
    fn test_purge_peer_drops_partial_transfers() {
        let config = config(100, 1_000_000);
        let (a, _) = chunks_for(&config, "a", vec![1u8; 300]);
        let (b, _) = chunks_for(&config, "b", vec![2u8; 300]);
        let mut reassembler = Reassembler::new(&config);

        reassembler.accept(PeerId::new(1), a[0].clone()).unwrap();
        reassembler.accept(PeerId::new(2), b[0].clone()).unwrap();

        assert_eq!(reassembler.purge_peer(PeerId::new(1)), 1);
        assert_eq!(reassembler.len(), 1);
    }
}
