//! MTProto message framing types.

use std::fmt;

/// A 64-bit MTProto message identifier.
///
/// The upper 32 bits hold the (server-corrected) Unix time in seconds, the
/// lower 32 bits a sub-second fraction. The two least significant bits are
/// always zero for client messages.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MessageId(pub i64);

impl MessageId {
    /// The Unix timestamp (seconds) encoded in the identifier.
    pub fn unix_secs(self) -> i64 {
        self.0 >> 32
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(v: i64) -> Self { Self(v) }
}

/// One framed message, as it appears inside a container or an encrypted
/// payload:
///
/// ```text
/// msg_id:long
/// seq_no:int
/// bytes:int
/// body:bytes
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: MessageId,
    /// Session-scoped sequence number (odd for content-related messages).
    pub seq_no: i32,
    /// The serialized TL body (constructor ID + fields).
    pub body: Vec<u8>,
}

impl Message {
    /// Size of the `msg_id` + `seq_no` + `bytes` header.
    pub const HEADER_LEN: usize = 8 + 4 + 4;

    /// Construct a message from its parts.
    pub fn new(id: MessageId, seq_no: i32, body: Vec<u8>) -> Self {
        Self { id, seq_no, body }
    }

    /// Append the envelope for `body` without building a [`Message`] first.
    ///
    /// The caller is responsible for `body.len()` fitting in an `i32`.
    pub fn write_envelope(buf: &mut impl Extend<u8>, id: MessageId, seq_no: i32, body: &[u8]) {
        buf.extend(id.0.to_le_bytes());
        buf.extend(seq_no.to_le_bytes());
        buf.extend((body.len() as u32).to_le_bytes());
        buf.extend(body.iter().copied());
    }

    /// Serialize into `buf`.
    pub fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::write_envelope(buf, self.id, self.seq_no, &self.body);
    }

    /// Serialize into a fresh vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(Self::HEADER_LEN + self.body.len());
        self.serialize(&mut v);
        v
    }

    /// Read one message from the front of `data`.
    ///
    /// Returns the message and the number of bytes consumed, or `None` if
    /// `data` is shorter than the header or the declared body length.
    pub fn parse(data: &[u8]) -> Option<(Self, usize)> {
        if data.len() < Self::HEADER_LEN {
            return None;
        }
        let id     = i64::from_le_bytes(data[..8].try_into().ok()?);
        let seq_no = i32::from_le_bytes(data[8..12].try_into().ok()?);
        let len    = u32::from_le_bytes(data[12..16].try_into().ok()?) as usize;
        let end    = Self::HEADER_LEN.checked_add(len)?;
        if data.len() < end {
            return None;
        }
        let body = data[Self::HEADER_LEN..end].to_vec();
        Some((Self { id: MessageId(id), seq_no, body }, end))
    }
}
