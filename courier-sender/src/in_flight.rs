//! Requests that have been written to the transport but not answered yet.

use std::collections::{BTreeMap, HashMap};

use courier_mtproto::MessageId;

use crate::errors::InvocationError;
use crate::packer::Batch;
use crate::request::{InvocationResult, RequestRecord};

/// Sent-but-unresolved requests, keyed by message id.
///
/// Container members are also reachable through their container's id, since
/// the server may answer a container as a whole (e.g. `bad_server_salt`).
#[derive(Debug, Default)]
pub struct InFlightSet {
    records:    BTreeMap<MessageId, RequestRecord>,
    containers: HashMap<MessageId, Vec<MessageId>>,
}

impl InFlightSet {
    /// Create an empty set.
    pub fn new() -> Self { Self::default() }

    /// Take ownership of a batch that has been handed to the transport.
    pub fn insert(&mut self, batch: Batch) {
        self.extend(batch.accepted);
    }

    /// Track framed records directly.
    pub fn extend(&mut self, records: impl IntoIterator<Item = RequestRecord>) {
        for record in records {
            self.insert_record(record);
        }
    }

    fn insert_record(&mut self, record: RequestRecord) {
        let Some(msg_id) = record.msg_id() else {
            // Unreachable for records coming out of the packer; dropping
            // resolves the caller with `Dropped`.
            tracing::warn!("[courier] Refusing to track an unframed request: {record:?}");
            return;
        };
        if let Some(container_id) = record.container_id() {
            self.containers.entry(container_id).or_default().push(msg_id);
        }
        // Ids only repeat if the framer's clock went backwards.
        if let Some(mut displaced) = self.records.insert(msg_id, record) {
            tracing::warn!("[courier] msg_id={msg_id} reused while still in flight, failing the older request");
            self.unindex(msg_id, &displaced);
            displaced.resolve(Err(InvocationError::Disconnected(format!(
                "msg_id {msg_id} was reused before a reply arrived"
            ))));
        }
    }

    /// Drop `msg_id` from the container index entry of `record`.
    fn unindex(&mut self, msg_id: MessageId, record: &RequestRecord) {
        let Some(container_id) = record.container_id() else { return };
        if let Some(members) = self.containers.get_mut(&container_id) {
            if let Some(pos) = members.iter().position(|id| *id == msg_id) {
                members.remove(pos);
            }
            if members.is_empty() {
                self.containers.remove(&container_id);
            }
        }
    }

    /// Number of tracked requests.
    pub fn len(&self) -> usize { self.records.len() }

    /// True if nothing is in flight.
    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// True if `msg_id` names a tracked request or container.
    pub fn contains(&self, msg_id: MessageId) -> bool {
        self.records.contains_key(&msg_id) || self.containers.contains_key(&msg_id)
    }

    /// Stop tracking the request with `msg_id`, or every request still
    /// tracked inside the container with that id.
    ///
    /// Records come back unresolved, in the order they were framed.
    pub fn pop(&mut self, msg_id: MessageId) -> Vec<RequestRecord> {
        if let Some(record) = self.records.remove(&msg_id) {
            self.unindex(msg_id, &record);
            return vec![record];
        }
        match self.containers.remove(&msg_id) {
            Some(members) => members.iter().filter_map(|id| self.records.remove(id)).collect(),
            None => Vec::new(),
        }
    }

    /// Resolve the request (or container members) named by `msg_id`.
    ///
    /// Returns how many requests were resolved; zero if `msg_id` is unknown.
    pub fn resolve(&mut self, msg_id: MessageId, result: InvocationResult) -> usize {
        let records = self.pop(msg_id);
        let n = records.len();
        for mut record in records {
            record.resolve(result.clone());
        }
        n
    }

    /// Fail every tracked request with a disconnect carrying `reason`.
    ///
    /// Returns how many were resolved; a second call returns zero. Requests
    /// still waiting in the pending queue are not touched.
    pub fn reject_all(&mut self, reason: &str) -> usize {
        self.containers.clear();
        let records = std::mem::take(&mut self.records);
        let n = records.len();
        if n > 0 {
            tracing::info!("[courier] Rejecting {n} in-flight requests: {reason}");
        }
        for (_, mut record) in records {
            record.resolve(Err(InvocationError::Disconnected(reason.to_owned())));
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestHandle;

    fn framed(id: i64, container: Option<i64>) -> (RequestRecord, RequestHandle) {
        let (mut record, handle) = RequestRecord::rpc(vec![0; 4]);
        record.set_msg_id(MessageId(id));
        if let Some(cid) = container {
            record.set_container_id(MessageId(cid));
        }
        (record, handle)
    }

    #[tokio::test]
    async fn reused_msg_id_fails_the_displaced_request() {
        let mut set = InFlightSet::new();
        let (old, old_handle) = framed(8, Some(100));
        let (sibling, _s) = framed(12, Some(100));
        let (new, new_handle) = framed(8, None);
        set.extend([old, sibling]);
        set.extend([new]);

        assert_eq!(set.len(), 2);
        match old_handle.await {
            Err(InvocationError::Disconnected(reason)) => assert!(reason.contains("reused")),
            other => panic!("unexpected result: {other:?}"),
        }

        // The container now only reaches the sibling; the newer record stays.
        assert_eq!(set.resolve(MessageId(100), Ok(vec![])), 1);
        assert!(set.contains(MessageId(8)));
        assert_eq!(set.resolve(MessageId(8), Ok(vec![1])), 1);
        assert_eq!(new_handle.await, Ok(vec![1]));
    }

    #[test]
    fn popping_a_member_shrinks_its_container() {
        let mut set = InFlightSet::new();
        let (a, _a) = framed(4, Some(20));
        let (b, _b) = framed(8, Some(20));
        set.extend([a, b]);

        assert_eq!(set.pop(MessageId(4)).len(), 1);
        assert_eq!(set.pop(MessageId(8)).len(), 1);
        assert!(!set.contains(MessageId(20)), "empty containers are forgotten");
        assert!(set.is_empty());
    }
}
