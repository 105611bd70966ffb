//! Sender side of fragmentation.
//!
//! A call body no larger than the split threshold goes out as one whole
//! envelope with no compression. Anything larger is cut into raw slices of
//! at most `split_threshold` bytes, each slice LZ4-compressed on its own,
//! and emitted as chunk envelopes:
//!
//! ```text
//! body ──split──→ [s0][s1][s2]...[sN]
//!        compress each ↓
//!        chunk(remaining=N, cum=|c0|) → chunk(remaining=N-1, cum=|c0|+|c1|) → ...
//! ```
//!
//! # Backpressure
//!
//! After each chunk the sender checks whether the transfer's cumulative
//! compressed size just crossed into a new `max_buffer_size` window (past
//! 1×, 2×, 3× the ceiling...). If it did and chunks remain, emission stops
//! and the rest of the transfer is parked in the
//! [`PendingSendQueue`](crate::PendingSendQueue) until the receiver sends
//! "continue transfer". The receiver evaluates [`crosses_ceiling`] on the
//! same chunk, so exactly one continue signal answers each pause.

use std::sync::Arc;

use netcall_protocol::{
    compress_chunk, ChunkEnvelope, Envelope, FunctionId, ProtocolError, Role, TransferId,
    WholeEnvelope,
};
use netcall_transport::{DeliveryPolicy, PeerId};

use crate::{PacketSink, ProtocolConfig};

/// Returns `true` if going from `before` to `after` cumulative bytes moves
/// into a later `ceiling`-sized window.
///
/// Windows are `(0, ceiling]`, `(ceiling, 2·ceiling]`, ... so the first
/// crossing happens once the total *exceeds* the ceiling.
pub fn crosses_ceiling(before: u64, after: u64, ceiling: u64) -> bool {
    let window = |bytes: u64| bytes.saturating_sub(1) / ceiling.max(1);
    after > before && window(after) > window(before)
}

/// A body that has been compressed and sliced, ready to be sent to any
/// number of peers.
///
/// Cloning a plan shares the chunk storage, so a broadcast keeps one copy
/// of the compressed body however many recipients it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Uncompressed body length.
    pub total_payload_len: u64,
    /// Compressed chunks, in order.
    pub chunks: Arc<[Vec<u8>]>,
}

impl ChunkPlan {
    /// Sum of the compressed chunk lengths.
    pub fn compressed_len(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }
}

/// What a call turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragments {
    /// Small enough for one packet.
    Whole(Envelope),
    /// Needs chunking.
    Chunked(ChunkPlan),
}

/// The remainder of one chunked call on its way to one peer.
#[derive(Debug, Clone)]
pub struct OutgoingTransfer {
    pub peer: PeerId,
    pub policy: DeliveryPolicy,
    pub role: Role,
    pub function_id: FunctionId,
    pub transfer_id: TransferId,
    total_payload_len: u64,
    chunks: Arc<[Vec<u8>]>,
    /// Index of the next chunk to emit.
    next: usize,
    cumulative_bytes: u64,
}

impl OutgoingTransfer {
    /// Starts a transfer of `plan` to `peer`.
    pub fn new(
        peer: PeerId,
        policy: DeliveryPolicy,
        role: Role,
        function_id: FunctionId,
        transfer_id: TransferId,
        plan: ChunkPlan,
    ) -> Self {
        Self {
            peer,
            policy,
            role,
            function_id,
            transfer_id,
            total_payload_len: plan.total_payload_len,
            chunks: plan.chunks,
            next: 0,
            cumulative_bytes: 0,
        }
    }

    /// Chunks not yet emitted.
    pub fn remaining_chunks(&self) -> usize {
        self.chunks.len() - self.next
    }

    /// Compressed bytes emitted so far.
    pub fn cumulative_bytes(&self) -> u64 {
        self.cumulative_bytes
    }

    /// Returns `true` once every chunk has been emitted.
    pub fn is_drained(&self) -> bool {
        self.next >= self.chunks.len()
    }
}

/// Result of one [`Fragmenter::emit`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Every chunk went out.
    Drained { sent: usize },
    /// The ceiling was crossed with chunks still left; park the transfer.
    Paused { sent: usize },
}

/// Splits and emits oversized calls.
#[derive(Debug, Clone)]
pub struct Fragmenter {
    split_threshold: usize,
    max_buffer_size: u64,
}

impl Fragmenter {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            split_threshold: config.split_threshold,
            max_buffer_size: config.max_buffer_size as u64,
        }
    }

    /// Turns an encoded call body into either a whole envelope or a chunk
    /// plan.
    ///
    /// Bodies at or below the split threshold are never compressed.
    pub fn fragment(
        &self,
        function_id: FunctionId,
        transfer_id: TransferId,
        body: Vec<u8>,
    ) -> Fragments {
        if body.len() <= self.split_threshold {
            return Fragments::Whole(Envelope::Whole(WholeEnvelope {
                function_id,
                transfer_id,
                payload: body,
            }));
        }

        let chunks: Arc<[Vec<u8>]> = body
            .chunks(self.split_threshold)
            .map(compress_chunk)
            .collect();

        tracing::trace!(
            %function_id,
            %transfer_id,
            body_len = body.len(),
            chunk_count = chunks.len(),
            "call fragmented"
        );

        Fragments::Chunked(ChunkPlan {
            total_payload_len: body.len() as u64,
            chunks,
        })
    }

    /// Emits chunks of `transfer` into `sink` until it drains or crosses the
    /// ceiling.
    ///
    /// Safe to call again on a paused transfer: it picks up with the next
    /// chunk and may pause again further along.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if a chunk envelope cannot be encoded;
    /// the transfer is then unusable and should be dropped.
    pub fn emit<S: PacketSink>(
        &self,
        transfer: &mut OutgoingTransfer,
        sink: &mut S,
    ) -> Result<EmitOutcome, ProtocolError> {
        let mut sent = 0;

        while let Some(data) = transfer.chunks.get(transfer.next).cloned() {
            let before = transfer.cumulative_bytes;
            let after = before + data.len() as u64;
            let remaining = transfer.chunks.len() - transfer.next - 1;

            let remaining_chunks = u32::try_from(remaining).map_err(|_| {
                ProtocolError::InvalidMessage(format!("{remaining} chunks is too many"))
            })?;
            let packet = Envelope::Chunk(ChunkEnvelope {
                function_id: transfer.function_id,
                total_payload_len: transfer.total_payload_len,
                transfer_id: transfer.transfer_id.clone(),
                remaining_chunks,
                cumulative_bytes: after,
                data,
            })
            .encode()?;

            sink.send(transfer.peer, transfer.policy, packet);
            transfer.next += 1;
            transfer.cumulative_bytes = after;
            sent += 1;

            if remaining > 0 && crosses_ceiling(before, after, self.max_buffer_size) {
                tracing::debug!(
                    peer = %transfer.peer,
                    transfer_id = %transfer.transfer_id,
                    cumulative_bytes = after,
                    remaining,
                    "transfer paused at buffer ceiling"
                );
                return Ok(EmitOutcome::Paused { sent });
            }
        }

        Ok(EmitOutcome::Drained { sent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Outbox;
    use netcall_protocol::decompress_chunk;

    fn fragmenter(split_threshold: usize, max_buffer_size: usize) -> Fragmenter {
        Fragmenter::new(&ProtocolConfig {
            split_threshold,
            max_buffer_size,
            ..ProtocolConfig::default()
        })
    }

    /// Bytes that LZ4 cannot shrink, so compressed sizes are predictable.
    fn noise(len: usize) -> Vec<u8> {
        use rand::RngCore;
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    fn transfer(plan: ChunkPlan) -> OutgoingTransfer {
        OutgoingTransfer::new(
            PeerId::new(1),
            DeliveryPolicy::Reliable,
            Role::Both,
            FunctionId(3),
            TransferId::new("t"),
            plan,
        )
    }

    fn decode_chunks(outbox: &mut Outbox) -> Vec<ChunkEnvelope> {
        outbox
            .take()
            .into_iter()
            .map(|p| match Envelope::decode(&p.bytes).unwrap() {
                Envelope::Chunk(c) => c,
                Envelope::Whole(_) => panic!("expected a chunk"),
            })
            .collect()
    }

    // =====================================================================
    // crosses_ceiling()
    // =====================================================================

    #[test]
    fn test_crosses_ceiling_only_when_exceeding() {
        assert!(!crosses_ceiling(0, 100, 100));
        assert!(crosses_ceiling(0, 101, 100));
        assert!(crosses_ceiling(90, 101, 100));
        assert!(!crosses_ceiling(101, 200, 100));
        assert!(crosses_ceiling(150, 250, 100));
        assert!(!crosses_ceiling(50, 50, 100));
    }

    // =====================================================================
    // fragment()
    // =====================================================================

    #[test]
    fn test_fragment_at_threshold_is_whole_and_uncompressed() {
        let body = vec![b'a'; 100];
        let frags = fragmenter(100, 1000).fragment(FunctionId(1), TransferId::new("t"), body.clone());
        match frags {
            Fragments::Whole(Envelope::Whole(w)) => assert_eq!(w.payload, body),
            other => panic!("expected whole envelope, got {other:?}"),
        }
    }

    #[test]
    fn test_fragment_above_threshold_is_chunked() {
        let body = vec![b'a'; 250];
        let frags = fragmenter(100, 1000).fragment(FunctionId(1), TransferId::new("t"), body.clone());
        let Fragments::Chunked(plan) = frags else {
            panic!("expected chunk plan");
        };

        assert_eq!(plan.total_payload_len, 250);
        assert_eq!(plan.chunks.len(), 3);

        let restored: Vec<u8> = plan
            .chunks
            .iter()
            .flat_map(|c| decompress_chunk(c, 100).unwrap())
            .collect();
        assert_eq!(restored, body);
    }

    // =====================================================================
    // emit()
    // =====================================================================

    #[test]
    fn test_emit_counts_down_remaining_and_accumulates_bytes() {
        let frag = fragmenter(100, 1_000_000);
        let Fragments::Chunked(plan) =
            frag.fragment(FunctionId(3), TransferId::new("t"), noise(350))
        else {
            panic!("expected chunk plan");
        };
        let compressed_len = plan.compressed_len();
        let mut t = transfer(plan);
        let mut outbox = Outbox::new();

        let outcome = frag.emit(&mut t, &mut outbox).unwrap();
        assert_eq!(outcome, EmitOutcome::Drained { sent: 4 });
        assert!(t.is_drained());

        let chunks = decode_chunks(&mut outbox);
        let remaining: Vec<u32> = chunks.iter().map(|c| c.remaining_chunks).collect();
        assert_eq!(remaining, vec![3, 2, 1, 0]);
        assert!(chunks[0].is_first());
        assert_eq!(chunks[3].cumulative_bytes, compressed_len);
        assert!(chunks.iter().all(|c| c.total_payload_len == 350));
    }

    #[test]
    fn test_emit_pauses_after_crossing_ceiling_and_resumes() {
        // ~106 compressed bytes per chunk, ceiling of 250: the first pause
        // comes after the third chunk (cumulative > 250), the next after
        // the fifth (cumulative > 500).
        let frag = fragmenter(100, 250);
        let Fragments::Chunked(plan) =
            frag.fragment(FunctionId(3), TransferId::new("t"), noise(800))
        else {
            panic!("expected chunk plan");
        };
        let mut t = transfer(plan);
        let mut outbox = Outbox::new();

        let first = frag.emit(&mut t, &mut outbox).unwrap();
        assert_eq!(first, EmitOutcome::Paused { sent: 3 });
        assert_eq!(t.remaining_chunks(), 5);
        assert!(t.cumulative_bytes() > 250);

        let second = frag.emit(&mut t, &mut outbox).unwrap();
        assert_eq!(second, EmitOutcome::Paused { sent: 2 });
        assert_eq!(t.remaining_chunks(), 3);

        while let EmitOutcome::Paused { .. } = frag.emit(&mut t, &mut outbox).unwrap() {}
        assert!(t.is_drained());
        assert_eq!(decode_chunks(&mut outbox).len(), 8);
    }

    #[test]
    fn test_emit_last_chunk_never_pauses() {
        // Crossing the ceiling on the final chunk has nothing to hold back.
        let frag = fragmenter(100, 150);
        let Fragments::Chunked(plan) =
            frag.fragment(FunctionId(3), TransferId::new("t"), noise(200))
        else {
            panic!("expected chunk plan");
        };
        let mut t = transfer(plan);

        let outcome = frag.emit(&mut t, &mut Outbox::new()).unwrap();
        assert_eq!(outcome, EmitOutcome::Drained { sent: 2 });
    }

    #[test]
    fn test_transfers_from_one_plan_share_chunks_and_advance_alone() {
        let frag = fragmenter(100, 250);
        let Fragments::Chunked(plan) =
            frag.fragment(FunctionId(3), TransferId::new("t"), noise(800))
        else {
            panic!("expected chunk plan");
        };
        let mut a = transfer(plan.clone());
        let b = OutgoingTransfer::new(
            PeerId::new(2),
            DeliveryPolicy::Reliable,
            Role::Both,
            FunctionId(3),
            TransferId::new("t"),
            plan,
        );
        assert!(Arc::ptr_eq(&a.chunks, &b.chunks));

        let outcome = frag.emit(&mut a, &mut Outbox::new()).unwrap();
        assert_eq!(outcome, EmitOutcome::Paused { sent: 3 });
        assert_eq!(a.remaining_chunks(), 5);
        assert_eq!(b.remaining_chunks(), 8);
        assert_eq!(b.cumulative_bytes(), 0);
    }
}
