//! Protocol configuration.

use serde::{Deserialize, Serialize};

use crate::RpcError;

/// Calls whose encoded body is larger than this are fragmented.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 500_000;

/// Compressed bytes a single transfer may put in flight before the sender
/// waits for the receiver's "continue transfer" signal.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10_000_000;

/// Configuration for fragmentation, reassembly and backpressure.
///
/// Both ends of a link should use the same `max_buffer_size`: the sender
/// pauses and the receiver asks to continue at the same byte boundaries.
/// The other fields are local policy.
///
/// `#[serde(default)]` lets a host load a partial JSON/RON document and
/// keep the defaults for everything it leaves out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Largest call body sent as a single whole envelope, and the raw size
    /// of each slice once a body is fragmented.
    ///
    /// Default: 500 000 bytes.
    pub split_threshold: usize,

    /// In-flight ceiling per transfer, in compressed bytes.
    ///
    /// Default: 10 000 000 bytes.
    pub max_buffer_size: usize,

    /// How many completed transfer ids to remember per node, so a late
    /// duplicate of a final chunk is recognised and not dispatched twice.
    /// 0 disables the check.
    ///
    /// Default: 1024.
    pub completed_cache_capacity: usize,

    /// Largest total payload a peer may announce for one transfer.
    /// Announcements above this are dropped before anything is allocated.
    ///
    /// Default: 256 MiB.
    pub max_payload_len: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            completed_cache_capacity: 1024,
            max_payload_len: 256 * 1024 * 1024,
        }
    }
}

impl ProtocolConfig {
    /// Checks that the configuration can actually move data.
    ///
    /// # Errors
    /// Returns [`RpcError::InvalidConfig`] if a threshold is zero or the
    /// payload limit is smaller than one whole envelope.
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.split_threshold == 0 {
            return Err(RpcError::InvalidConfig(
                "split_threshold must be greater than 0".into(),
            ));
        }
        if self.max_buffer_size == 0 {
            return Err(RpcError::InvalidConfig(
                "max_buffer_size must be greater than 0".into(),
            ));
        }
        if self.max_payload_len < self.split_threshold {
            return Err(RpcError::InvalidConfig(format!(
                "max_payload_len {} is below split_threshold {}",
                self.max_payload_len, self.split_threshold
            )));
        }
        Ok(())
    }
}
