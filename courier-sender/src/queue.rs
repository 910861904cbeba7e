//! The queue of requests waiting for their first flush.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::errors::InvocationError;
use crate::request::RequestRecord;

#[derive(Debug, Default)]
struct State {
    items:  VecDeque<RequestRecord>,
    /// Set by [`PendingQueue::close`]; new records are failed with it.
    closed: Option<String>,
}

/// FIFO of not-yet-framed [`RequestRecord`]s.
///
/// Any number of producers may [`append`](Self::append) concurrently; one
/// consumer drains from the front. Readiness is level-triggered: an append
/// that lands between the consumer's emptiness check and its wait is never
/// lost, because [`Notify::notify_one`] leaves a permit behind when nobody is
/// waiting yet.
///
/// Once [`close`](Self::close)d, the queue accepts nothing: every record
/// handed to it afterwards is resolved on the spot with
/// [`InvocationError::Disconnected`].
#[derive(Debug, Default)]
pub struct PendingQueue {
    state: Mutex<State>,
    ready: Notify,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self { Self::default() }

    /// Add `record` at the tail. Never blocks on the consumer.
    pub fn append(&self, record: RequestRecord) {
        self.append_all([record]);
    }

    /// Add every record at the tail, keeping their relative order.
    pub fn append_all(&self, records: impl IntoIterator<Item = RequestRecord>) {
        self.insert(records, |items, record| items.push_back(record));
    }

    /// Suspend until the queue is non-empty.
    ///
    /// Returns immediately if there is already work. Cancel safe.
    pub async fn await_work(&self) {
        loop {
            let notified = self.ready.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Remove the front record. Reserved for the batch builder.
    pub fn pop_front(&self) -> Option<RequestRecord> {
        self.state.lock().items.pop_front()
    }

    /// Return a record to the front. Reserved for the batch builder.
    pub fn push_front(&self, record: RequestRecord) {
        self.push_front_all(vec![record]);
    }

    /// Return several records to the front; the first one ends up at the head.
    pub fn push_front_all(&self, records: Vec<RequestRecord>) {
        self.insert(records.into_iter().rev(), |items, record| items.push_front(record));
    }

    fn insert(
        &self,
        records: impl IntoIterator<Item = RequestRecord>,
        mut put: impl FnMut(&mut VecDeque<RequestRecord>, RequestRecord),
    ) {
        let (woke, rejected) = {
            let mut state = self.state.lock();
            match state.closed.clone() {
                Some(reason) => (false, Some((reason, records.into_iter().collect::<Vec<_>>()))),
                None => {
                    let was_empty = state.items.is_empty();
                    for record in records {
                        put(&mut state.items, record);
                    }
                    (was_empty && !state.items.is_empty(), None)
                }
            }
        };
        if woke {
            self.ready.notify_one();
        }
        // Resolve outside the lock.
        if let Some((reason, records)) = rejected {
            for mut record in records {
                record.resolve(Err(InvocationError::Disconnected(reason.clone())));
            }
        }
    }

    /// Stop accepting records and return everything still queued, in order.
    ///
    /// The first reason sticks; closing again just drains.
    pub fn close(&self, reason: &str) -> Vec<RequestRecord> {
        let mut state = self.state.lock();
        if state.closed.is_none() {
            state.closed = Some(reason.to_owned());
        }
        state.items.drain(..).collect()
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool { self.state.lock().closed.is_some() }

    /// Remove and return everything still queued, in order.
    pub fn drain(&self) -> Vec<RequestRecord> {
        self.state.lock().items.drain(..).collect()
    }

    /// Number of queued records.
    pub fn len(&self) -> usize { self.state.lock().items.len() }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool { self.state.lock().items.is_empty() }
}
