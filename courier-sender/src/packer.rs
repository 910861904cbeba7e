//! Turns queued requests into wire-ready batches.
//!
//! # Flow
//!
//! ```text
//! PendingQueue ─pop─► size check ─► SessionFramer ─► framed bytes
//!      ▲                  │                               │
//!      └── push_front ◄───┘ (batch full)        > 1 record: msg_container
//! ```

use std::sync::Arc;

use courier_mtproto::{FramingError, Message, MessageId, SessionFramer, container};

use crate::config::PackerConfig;
use crate::errors::InvocationError;
use crate::queue::PendingQueue;
use crate::request::RequestRecord;

/// One flush worth of requests and the bytes that carry them.
#[derive(Debug)]
pub struct Batch {
    /// Requests in the order they were framed.
    pub accepted: Vec<RequestRecord>,
    /// A single framed message, or a framed `msg_container` holding all of
    /// `accepted`.
    pub bytes: Vec<u8>,
}

impl Batch {
    /// Message id of the wrapping container, if the batch has one.
    pub fn container_id(&self) -> Option<MessageId> {
        self.accepted.first().and_then(RequestRecord::container_id)
    }

    /// Number of requests carried.
    pub fn len(&self) -> usize { self.accepted.len() }

    /// Always false for batches returned by the packer.
    pub fn is_empty(&self) -> bool { self.accepted.is_empty() }
}

/// Drains a [`PendingQueue`] into batches that respect the container
/// ceilings.
///
/// The packer owns the framer, and [`next_batch`](Self::next_batch) takes
/// `&mut self`, so two drains can never interleave.
pub struct MessagePacker<F> {
    queue:  Arc<PendingQueue>,
    framer: F,
    config: PackerConfig,
}

impl<F: SessionFramer> MessagePacker<F> {
    /// Create a packer with its own empty queue.
    pub fn new(framer: F, config: PackerConfig) -> Self {
        Self::with_queue(Arc::new(PendingQueue::new()), framer, config)
    }

    /// Create a packer draining an existing queue.
    pub fn with_queue(queue: Arc<PendingQueue>, framer: F, mut config: PackerConfig) -> Self {
        config.max_batch_count = config.max_batch_count.max(1);
        Self { queue, framer, config }
    }

    /// The queue producers append to.
    pub fn queue(&self) -> &Arc<PendingQueue> { &self.queue }

    /// Limits in effect.
    pub fn config(&self) -> &PackerConfig { &self.config }

    /// The session framer.
    pub fn framer(&self) -> &F { &self.framer }

    /// Mutable access to the session framer (e.g. to reset it on reconnect).
    pub fn framer_mut(&mut self) -> &mut F { &mut self.framer }

    /// Enqueue one request.
    pub fn submit(&self, record: RequestRecord) {
        self.queue.append(record);
    }

    /// Enqueue several requests, keeping their order.
    pub fn submit_all(&self, records: impl IntoIterator<Item = RequestRecord>) {
        self.queue.append_all(records);
    }

    /// Wait for work, then build the next batch.
    ///
    /// `Ok(None)` means every drained request was rejected as oversized; call
    /// again to wait for more. The only suspension point is before anything
    /// is drained, so dropping this future never loses a request.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>, FramingError> {
        self.queue.await_work().await;
        self.try_next_batch()
    }

    /// Build a batch from whatever is queued right now, without waiting.
    ///
    /// On a framing error every request drained by this call that is not
    /// already resolved goes back to the front of the queue, in order and
    /// with its ids cleared, and the error is returned.
    pub fn try_next_batch(&mut self) -> Result<Option<Batch>, FramingError> {
        let max_count = self.config.max_batch_count;
        let max_bytes = self.config.max_batch_bytes;

        let mut buf      = Vec::new();
        let mut accepted = Vec::new();
        let mut size     = 0usize;

        while accepted.len() < max_count {
            let Some(mut record) = self.queue.pop_front() else { break };

            // Read once: the size charged and the bytes framed must agree.
            let after   = record.after_id();
            let charged = self.config.charged_size(record.payload().len() + self.framer.wrapper_len(after));

            // Can never fit any batch: fail it here so it does not hold up
            // the requests behind it.
            if charged > max_bytes {
                tracing::warn!("[courier] Request payload is too big ({charged} > {max_bytes} bytes) and cannot be sent");
                record.resolve(Err(InvocationError::PayloadTooLarge { len: charged, limit: max_bytes }));
                continue;
            }

            let trial = size + charged;
            if trial > max_bytes {
                // Batch full; this record heads the next one.
                self.queue.push_front(record);
                break;
            }

            let framed = self.framer.write_data_as_message(
                &mut buf,
                record.payload(),
                record.content_related(),
                after,
            );
            match framed {
                Ok(msg_id) => {
                    tracing::debug!("[courier] Assigned msg_id={msg_id} ({} bytes)", record.payload().len());
                    record.set_msg_id(msg_id);
                    accepted.push(record);
                    size = trial;
                }
                Err(e) => {
                    accepted.push(record);
                    self.requeue(accepted);
                    return Err(e);
                }
            }
        }

        if accepted.is_empty() {
            return Ok(None);
        }
        if accepted.len() == 1 {
            return Ok(Some(Batch { accepted, bytes: buf }));
        }

        let body = container::wrap(accepted.len(), &buf);
        let mut bytes = Vec::with_capacity(Message::HEADER_LEN + body.len());
        match self.framer.write_data_as_message(&mut bytes, &body, false, None) {
            Ok(container_id) => {
                tracing::debug!("[courier] Packed {} requests into container {container_id}", accepted.len());
                for record in &mut accepted {
                    record.set_container_id(container_id);
                }
                Ok(Some(Batch { accepted, bytes }))
            }
            Err(e) => {
                self.requeue(accepted);
                Err(e)
            }
        }
    }

    fn requeue(&self, mut records: Vec<RequestRecord>) {
        tracing::warn!("[courier] Framing failed, returning {} requests to the queue", records.len());
        for record in &mut records {
            record.clear_ids();
        }
        self.queue.push_front_all(records);
    }
}
