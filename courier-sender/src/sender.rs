//! The flush loop and the handle callers talk to.

use std::sync::Arc;

use courier_mtproto::{FramingError, MessageId, SessionFramer};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::PackerConfig;
use crate::errors::{InvocationError, RpcError, SendError};
use crate::in_flight::InFlightSet;
use crate::packer::{Batch, MessagePacker};
use crate::queue::PendingQueue;
use crate::request::{InvocationResult, MsgIdCell, RequestHandle, RequestRecord};
use crate::transport::Transport;

// ─── SenderHandle ─────────────────────────────────────────────────────────────

/// Cheaply cloneable access to a [`Sender`]'s queue and in-flight set.
///
/// Submitting never waits for the flush loop. The reader side uses
/// [`resolve`](Self::resolve) and [`resend`](Self::resend) as server replies
/// come in.
#[derive(Clone, Debug)]
pub struct SenderHandle {
    queue:     Arc<PendingQueue>,
    in_flight: Arc<Mutex<InFlightSet>>,
}

impl SenderHandle {
    /// Enqueue a prepared record.
    pub fn submit(&self, record: RequestRecord) {
        self.queue.append(record);
    }

    /// Enqueue several records, keeping their order.
    pub fn submit_all(&self, records: impl IntoIterator<Item = RequestRecord>) {
        self.queue.append_all(records);
    }

    /// Enqueue a content-related call and return the handle to await.
    pub fn invoke(&self, payload: Vec<u8>) -> RequestHandle {
        let (record, handle) = RequestRecord::rpc(payload);
        self.submit(record);
        handle
    }

    /// Like [`invoke`](Self::invoke), but processed after `after` on the server.
    pub fn invoke_after(&self, payload: Vec<u8>, after: MsgIdCell) -> RequestHandle {
        let (record, handle) = RequestRecord::rpc(payload);
        self.submit(record.with_after(after));
        handle
    }

    /// Resolve the in-flight request (or container) named by `msg_id`.
    ///
    /// Returns how many requests were resolved.
    pub fn resolve(&self, msg_id: MessageId, result: InvocationResult) -> usize {
        self.in_flight.lock().resolve(msg_id, result)
    }

    /// Resolve `msg_id` with the body of its `rpc_result`.
    ///
    /// An `rpc_error` body fails the request with [`InvocationError::Rpc`];
    /// anything else is delivered as the response.
    pub fn resolve_reply(&self, msg_id: MessageId, body: Vec<u8>) -> usize {
        let result = match RpcError::from_body(&body) {
            Some(e) => Err(InvocationError::Rpc(e)),
            None    => Ok(body),
        };
        self.resolve(msg_id, result)
    }

    /// True once [`disconnect`](Self::disconnect) has run.
    pub fn is_closed(&self) -> bool { self.queue.is_closed() }

    /// Put the in-flight request (or container members) named by `msg_id`
    /// back at the front of the queue to be framed again with new ids.
    ///
    /// Returns how many requests were re-queued.
    pub fn resend(&self, msg_id: MessageId) -> usize {
        let mut records = self.in_flight.lock().pop(msg_id);
        let n = records.len();
        if n > 0 {
            tracing::debug!("[courier] Re-sending {n} requests for msg_id={msg_id}");
            for record in &mut records {
                record.clear_ids();
            }
            self.queue.push_front_all(records);
        }
        n
    }

    /// Fail every in-flight request with a disconnect. Idempotent.
    pub fn cancel_in_flight(&self, reason: &str) -> usize {
        self.in_flight.lock().reject_all(reason)
    }

    /// Tear the session down: fail everything in flight, then everything
    /// still queued, with `reason`.
    ///
    /// The queue is closed for good, so anything submitted through any clone
    /// of this handle afterwards fails immediately with the same reason.
    ///
    /// Returns `(in_flight, pending)` counts of requests failed.
    pub fn disconnect(&self, reason: &str) -> (usize, usize) {
        let queued = self.queue.close(reason);
        let in_flight = self.cancel_in_flight(reason);
        let pending = queued.len();
        for mut record in queued {
            record.resolve(Err(InvocationError::Disconnected(reason.to_owned())));
        }
        if in_flight + pending > 0 {
            tracing::warn!("[courier] Disconnected ({reason}): failed {in_flight} in-flight and {pending} queued requests");
        }
        (in_flight, pending)
    }

    /// Number of requests waiting for their first flush.
    pub fn pending(&self) -> usize { self.queue.len() }

    /// Number of requests sent and awaiting a reply.
    pub fn in_flight(&self) -> usize { self.in_flight.lock().len() }
}

// ─── Sender ───────────────────────────────────────────────────────────────────

/// Owns the packer and drives batches onto a [`Transport`].
///
/// # Example
///
/// ```rust,no_run
/// use courier_mtproto::MtpState;
/// use courier_sender::{AbridgedTransport, PackerConfig, Sender};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn f(stream: tokio::net::TcpStream) {
/// let sender = Sender::new(MtpState::new(), PackerConfig::default());
/// let handle = sender.handle();
/// let cancel = CancellationToken::new();
/// tokio::spawn(sender.run(AbridgedTransport::new(stream), cancel.clone()));
///
/// let reply = handle.invoke(vec![0u8; 12]);
/// # let _ = reply;
/// # }
/// ```
pub struct Sender<F> {
    packer:    MessagePacker<F>,
    in_flight: Arc<Mutex<InFlightSet>>,
}

impl<F: SessionFramer> Sender<F> {
    /// Create a sender with an empty queue.
    pub fn new(framer: F, config: PackerConfig) -> Self {
        Self {
            packer:    MessagePacker::new(framer, config),
            in_flight: Arc::new(Mutex::new(InFlightSet::new())),
        }
    }

    /// A handle for submitting and resolving requests.
    pub fn handle(&self) -> SenderHandle {
        SenderHandle {
            queue:     self.packer.queue().clone(),
            in_flight: self.in_flight.clone(),
        }
    }

    /// The underlying packer.
    pub fn packer(&self) -> &MessagePacker<F> { &self.packer }

    /// Mutable access to the underlying packer.
    pub fn packer_mut(&mut self) -> &mut MessagePacker<F> { &mut self.packer }

    /// Wait for work and build the next batch without sending it.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>, FramingError> {
        self.packer.next_batch().await
    }

    /// Record that `batch` has been handed to the transport.
    pub fn mark_sent(&self, batch: Batch) {
        self.in_flight.lock().insert(batch);
    }

    /// One flush cycle: wait for work, build a batch, send it, track it.
    ///
    /// Returns how many requests went out. The batch is tracked as in flight
    /// before it is written, so a disconnect racing the write, or following a
    /// failed one, still fails it.
    pub async fn flush<T: Transport>(&mut self, transport: &mut T) -> Result<usize, SendError> {
        let Some(batch) = self.packer.next_batch().await? else { return Ok(0) };
        self.send_batch(transport, batch).await
    }

    async fn send_batch<T: Transport>(&mut self, transport: &mut T, batch: Batch) -> Result<usize, SendError> {
        let Batch { accepted, bytes } = batch;
        let n = accepted.len();
        self.in_flight.lock().extend(accepted);
        transport.send(&bytes).await?;
        Ok(n)
    }

    /// Run the flush loop until `cancel` fires or sending fails, then
    /// [`disconnect`](SenderHandle::disconnect) so no request is left
    /// waiting.
    pub async fn run<T: Transport>(mut self, mut transport: T, cancel: CancellationToken) -> Result<(), SendError> {
        let handle = self.handle();
        tracing::info!("[courier] Flush loop started");

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                next = self.packer.next_batch() => next,
            };
            match next {
                Ok(Some(batch)) => {
                    if let Err(e) = self.send_batch(&mut transport, batch).await {
                        break Err(e);
                    }
                }
                Ok(None) => {}
                Err(e) => break Err(SendError::from(e)),
            }
        };

        let reason = match &outcome {
            Ok(())  => "sender shut down".to_owned(),
            Err(e)  => e.to_string(),
        };
        handle.disconnect(&reason);
        tracing::info!("[courier] Flush loop stopped ({reason})");
        outcome
    }
}
