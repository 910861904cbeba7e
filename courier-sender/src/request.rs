//! Outstanding requests and their result channels.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::task::{Context, Poll};

use courier_mtproto::MessageId;
use tokio::sync::oneshot;

use crate::errors::InvocationError;

/// What a request eventually resolves to: the response body or the reason it
/// failed.
pub type InvocationResult = Result<Vec<u8>, InvocationError>;

// ─── MsgIdCell ────────────────────────────────────────────────────────────────

/// Shared slot holding the message id a request was last framed with.
///
/// The packer writes it, the caller's [`RequestHandle`] and any dependent
/// request read it. Client message ids are never zero, so zero means
/// "not framed yet".
#[derive(Clone, Default)]
pub struct MsgIdCell(Arc<AtomicI64>);

impl MsgIdCell {
    /// An empty cell.
    pub fn new() -> Self { Self::default() }

    /// A cell that already names `id`, for depending on a message framed
    /// outside this engine.
    pub fn fixed(id: MessageId) -> Self {
        Self(Arc::new(AtomicI64::new(id.0)))
    }

    /// The current id, if any.
    pub fn get(&self) -> Option<MessageId> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            v => Some(MessageId(v)),
        }
    }

    pub(crate) fn set(&self, id: Option<MessageId>) {
        self.0.store(id.map_or(0, |m| m.0), Ordering::Release);
    }
}

impl fmt::Debug for MsgIdCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgIdCell({:?})", self.get())
    }
}

// ─── RequestRecord ────────────────────────────────────────────────────────────

/// One call waiting to be framed, or already on the wire.
///
/// A record lives in exactly one place at a time: the pending queue, a batch
/// being built, or the in-flight set. Whoever holds it last resolves it.
pub struct RequestRecord {
    payload:         Vec<u8>,
    content_related: bool,
    after:           Option<MsgIdCell>,
    msg_id:          MsgIdCell,
    container_id:    Option<MessageId>,
    tx:              Option<oneshot::Sender<InvocationResult>>,
}

impl RequestRecord {
    /// Create a record for `payload` and the handle its caller awaits.
    ///
    /// `content_related` is true for RPC calls and false for service traffic
    /// such as acknowledgements.
    pub fn new(payload: Vec<u8>, content_related: bool) -> (Self, RequestHandle) {
        let (tx, rx) = oneshot::channel();
        let msg_id = MsgIdCell::new();
        let record = Self {
            payload,
            content_related,
            after: None,
            msg_id: msg_id.clone(),
            container_id: None,
            tx: Some(tx),
        };
        (record, RequestHandle { msg_id, rx })
    }

    /// Shorthand for a content-related RPC call.
    pub fn rpc(payload: Vec<u8>) -> (Self, RequestHandle) {
        Self::new(payload, true)
    }

    /// Ask for this record to be processed after the message in `after`.
    ///
    /// The cell is read when this record is framed, so the dependency only
    /// has an effect if it has been framed by then.
    pub fn with_after(mut self, after: MsgIdCell) -> Self {
        self.after = Some(after);
        self
    }

    /// Serialized request body.
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Whether the request consumes a sequence number.
    pub fn content_related(&self) -> bool { self.content_related }

    /// The dependency's current message id, if there is one and it is framed.
    pub fn after_id(&self) -> Option<MessageId> {
        self.after.as_ref().and_then(MsgIdCell::get)
    }

    /// Message id assigned when this record was framed.
    pub fn msg_id(&self) -> Option<MessageId> { self.msg_id.get() }

    /// Id of the container this record was sent in, if it was batched.
    pub fn container_id(&self) -> Option<MessageId> { self.container_id }

    /// True once the result channel has been used.
    pub fn is_resolved(&self) -> bool { self.tx.is_none() }

    pub(crate) fn set_msg_id(&mut self, id: MessageId) {
        self.msg_id.set(Some(id));
    }

    pub(crate) fn set_container_id(&mut self, id: MessageId) {
        self.container_id = Some(id);
    }

    /// Forget framing results so the record can be framed again.
    pub(crate) fn clear_ids(&mut self) {
        self.msg_id.set(None);
        self.container_id = None;
    }

    /// Deliver `result` to the caller.
    ///
    /// Only the first call has an effect; later calls return `false`.
    pub fn resolve(&mut self, result: InvocationResult) -> bool {
        match self.tx.take() {
            // The caller may have stopped waiting; that still counts.
            Some(tx) => { let _ = tx.send(result); true }
            None     => false,
        }
    }
}

impl fmt::Debug for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRecord")
            .field("len", &self.payload.len())
            .field("content_related", &self.content_related)
            .field("after", &self.after_id())
            .field("msg_id", &self.msg_id())
            .field("container_id", &self.container_id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

// ─── RequestHandle ────────────────────────────────────────────────────────────

/// The caller's side of a [`RequestRecord`].
///
/// Await it to get the result. If the record is dropped without being
/// resolved the handle yields [`InvocationError::Dropped`].
pub struct RequestHandle {
    msg_id: MsgIdCell,
    rx:     oneshot::Receiver<InvocationResult>,
}

impl RequestHandle {
    /// Message id the request currently carries on the wire.
    pub fn msg_id(&self) -> Option<MessageId> { self.msg_id.get() }

    /// A cell other records can depend on via [`RequestRecord::with_after`].
    pub fn id_cell(&self) -> MsgIdCell { self.msg_id.clone() }

    /// Non-blocking check for a result.
    pub fn try_result(&mut self) -> Option<InvocationResult> {
        match self.rx.try_recv() {
            Ok(r) => Some(r),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(InvocationError::Dropped)),
        }
    }
}

impl Future for RequestHandle {
    type Output = InvocationResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(InvocationError::Dropped)))
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle").field("msg_id", &self.msg_id()).finish()
    }
}
