//! Batching limits.

use courier_mtproto::container;

/// Ceilings applied by [`MessagePacker`](crate::MessagePacker) to every batch.
///
/// The defaults are the values the MTProto server enforces on
/// `msg_container`; lower them only to batch more conservatively.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PackerConfig {
    /// Maximum number of requests per batch (values below 1 are treated as 1).
    pub max_batch_count:  usize,
    /// Maximum cumulative size of payloads plus overhead per batch.
    pub max_batch_bytes:  usize,
    /// Bytes charged per message on top of its payload.
    pub message_overhead: usize,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            max_batch_count:  container::MAX_CONTAINER_LEN,
            max_batch_bytes:  container::MAX_CONTAINER_SIZE,
            message_overhead: container::MESSAGE_OVERHEAD,
        }
    }
}

impl PackerConfig {
    /// Set the per-batch request count ceiling.
    pub fn max_batch_count(mut self, n: usize) -> Self {
        self.max_batch_count = n;
        self
    }

    /// Set the per-batch byte ceiling.
    pub fn max_batch_bytes(mut self, n: usize) -> Self {
        self.max_batch_bytes = n;
        self
    }

    /// Set the per-message overhead.
    pub fn message_overhead(mut self, n: usize) -> Self {
        self.message_overhead = n;
        self
    }

    /// Size a single request is charged against [`max_batch_bytes`](Self::max_batch_bytes).
    ///
    /// `payload_len` includes whatever the framer wraps around the payload.
    pub fn charged_size(&self, payload_len: usize) -> usize {
        payload_len.saturating_add(self.message_overhead)
    }
}
