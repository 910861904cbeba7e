//! MTProto client session state.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::framer::{FramingError, SessionFramer};
use crate::message::{Message, MessageId};
use crate::tl;

/// Tracks per-connection MTProto session state.
///
/// `MtpState` hands out message ids and sequence numbers and writes the
/// per-message envelope. It is cheap to create and can be [`reset`](Self::reset)
/// on reconnect.
///
/// # Example
///
/// ```rust
/// use courier_mtproto::{MtpState, SessionFramer};
///
/// let mut state = MtpState::new();
/// let mut buf = Vec::new();
/// let id = state.write_data_as_message(&mut buf, &[0u8; 8], true, None).unwrap();
/// assert_eq!(id.0 & 3, 0);
/// ```
#[derive(Debug)]
pub struct MtpState {
    session_id:  i64,
    /// Number of content-related messages sent in this session.
    sequence:    i32,
    last_msg_id: i64,
    /// Current server salt, consumed by the encryption layer.
    pub salt:    i64,
    /// Clock skew in seconds vs. server.
    pub time_offset: i32,
}

impl MtpState {
    /// Create a fresh session with a random session id.
    pub fn new() -> Self {
        Self::with_session_id(random_i64(), 0, 0)
    }

    /// Create a session with explicit parameters (restored sessions, tests).
    pub fn with_session_id(session_id: i64, salt: i64, time_offset: i32) -> Self {
        Self { session_id, sequence: 0, last_msg_id: 0, salt, time_offset }
    }

    /// Return the current session_id.
    pub fn session_id(&self) -> i64 { self.session_id }

    /// Number of content-related messages framed so far.
    pub fn sequence(&self) -> i32 { self.sequence }

    /// Start a new session: new session id, sequence and id history cleared.
    ///
    /// Salt and time offset survive, they belong to the auth key.
    pub fn reset(&mut self) {
        self.session_id  = random_i64();
        self.sequence    = 0;
        self.last_msg_id = 0;
    }

    /// Compute the next message ID (based on corrected server time).
    ///
    /// Strictly increasing within the session; the two low bits are zero.
    pub fn next_msg_id(&mut self) -> MessageId {
        let now   = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let secs  = (now.as_secs() as i64).wrapping_add(self.time_offset as i64);
        let nanos = now.subsec_nanos() as i64;
        let mut id = (secs << 32) | (nanos << 2);
        if self.last_msg_id >= id {
            id = self.last_msg_id + 4;
        }
        self.last_msg_id = id;
        MessageId(id)
    }

    /// Sequence number for the next message.
    ///
    /// Content-related messages get an odd number and advance the counter;
    /// everything else (acks, containers) reuses the current even slot.
    pub fn next_seq_no(&mut self, content_related: bool) -> i32 {
        if content_related {
            let n = self.sequence * 2 + 1;
            self.sequence += 1;
            n
        } else {
            self.sequence * 2
        }
    }

    /// Re-derive the clock offset from a message id known to be correct
    /// (e.g. the server's id in a `bad_msg_notification` with code 16/17).
    ///
    /// Returns the new offset in seconds.
    pub fn update_time_offset(&mut self, correct_msg_id: MessageId) -> i32 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs() as i64;
        let old = self.time_offset;
        self.time_offset = correct_msg_id.unix_secs().wrapping_sub(now) as i32;
        if self.time_offset != old {
            self.last_msg_id = 0;
            log::warn!(
                "[courier] Corrected clock offset {old}s → {}s (server msg_id {correct_msg_id})",
                self.time_offset
            );
        }
        self.time_offset
    }
}

impl Default for MtpState {
    fn default() -> Self { Self::new() }
}

impl SessionFramer for MtpState {
    fn write_data_as_message(
        &mut self,
        buf:             &mut Vec<u8>,
        data:            &[u8],
        content_related: bool,
        after:           Option<MessageId>,
    ) -> Result<MessageId, FramingError> {
        let wrapped;
        let query: &[u8] = match after {
            Some(after) => {
                wrapped = tl::invoke_after_msg(after, data);
                &wrapped
            }
            None => data,
        };
        let body = tl::gzip_if_smaller(content_related, query)?;
        if i32::try_from(body.len()).is_err() {
            return Err(FramingError::BodyTooLarge(body.len()));
        }

        let msg_id = self.next_msg_id();
        let seq_no = self.next_seq_no(content_related);
        Message::write_envelope(buf, msg_id, seq_no, &body);
        log::debug!("[courier] Framed msg_id={msg_id} seq_no={seq_no} ({} bytes)", body.len());
        Ok(msg_id)
    }

    fn wrapper_len(&self, after: Option<MessageId>) -> usize {
        after.map_or(0, |_| tl::INVOKE_AFTER_MSG_HEADER_LEN)
    }
}

fn random_i64() -> i64 {
    let mut b = [0u8; 8];
    match getrandom::getrandom(&mut b) {
        Ok(()) => i64::from_le_bytes(b),
        Err(e) => {
            log::warn!("[courier] getrandom failed ({e}), deriving session id from the clock");
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as i64)
                .unwrap_or_default()
        }
    }
}
