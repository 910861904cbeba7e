//! `msg_container` layout.
//!
//! ```text
//! constructor:int   0x73f1f8dc
//! count:int
//! messages:         count × (msg_id:long seq_no:int bytes:int body)
//! ```

use std::fmt;

use crate::message::Message;
use crate::tl::ID_MSG_CONTAINER;

/// Maximum number of messages the server accepts inside one container.
pub const MAX_CONTAINER_LEN: usize = 100;

/// Maximum cumulative size of the messages inside one container.
pub const MAX_CONTAINER_SIZE: usize = 1_044_456 - 8;

/// Per-message envelope overhead counted against [`MAX_CONTAINER_SIZE`].
pub const MESSAGE_OVERHEAD: usize = Message::HEADER_LEN;

/// Size of the constructor + count prefix.
pub const HEADER_LEN: usize = 8;

/// Errors produced while reading a container back.
#[derive(Clone, Debug, PartialEq)]
pub enum ContainerError {
    /// The body does not start with the `msg_container` constructor.
    NotAContainer(u32),
    /// The body ended before `expected` messages were read.
    Truncated {
        /// Member count declared in the header.
        expected: usize,
        /// Members read before running out of bytes.
        read:     usize,
    },
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAContainer(id) => write!(f, "not a msg_container (constructor {id:#010x})"),
            Self::Truncated { expected, read } => {
                write!(f, "container truncated: read {read} of {expected} messages")
            }
        }
    }
}
impl std::error::Error for ContainerError {}

/// Write the container prefix for `count` members.
pub fn write_header(buf: &mut impl Extend<u8>, count: usize) {
    buf.extend(ID_MSG_CONTAINER.to_le_bytes());
    buf.extend((count as i32).to_le_bytes());
}

/// Build a container body from already-framed member bytes.
pub fn wrap(count: usize, framed: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(HEADER_LEN + framed.len());
    write_header(&mut body, count);
    body.extend_from_slice(framed);
    body
}

/// True if `body` starts with the `msg_container` constructor.
pub fn is_container(body: &[u8]) -> bool {
    body.len() >= 4 && body[..4] == ID_MSG_CONTAINER.to_le_bytes()
}

/// Read every member of a container body.
pub fn parse(body: &[u8]) -> Result<Vec<Message>, ContainerError> {
    if body.len() < HEADER_LEN {
        return Err(ContainerError::Truncated { expected: 0, read: 0 });
    }
    let cid = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    if cid != ID_MSG_CONTAINER {
        return Err(ContainerError::NotAContainer(cid));
    }
    let count = u32::from_le_bytes([body[4], body[5], body[6], body[7]]) as usize;

    let mut pos = HEADER_LEN;
    let mut out = Vec::with_capacity(count.min(MAX_CONTAINER_LEN));
    for read in 0..count {
        let (msg, used) = Message::parse(&body[pos..])
            .ok_or(ContainerError::Truncated { expected: count, read })?;
        pos += used;
        out.push(msg);
    }
    Ok(out)
}
