//! Error types for courier-sender.

use std::{fmt, io};

use courier_mtproto::{FramingError, tl};

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// A server-side failure carried in an `rpc_error` reply.
///
/// Trailing numbers in the message are split off into [`value`](Self::value),
/// so `FLOOD_WAIT_30` becomes `name = "FLOOD_WAIT"`, `value = Some(30)`.
/// The reader side builds these with [`from_body`](Self::from_body) (or
/// through [`SenderHandle::resolve_reply`](crate::SenderHandle::resolve_reply)).
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error message without its numeric suffix.
    pub name: String,
    /// Numeric suffix of the message, if any.
    pub value: Option<u32>,
}

impl RpcError {
    /// Build from a status code and the raw error message.
    pub fn new(code: i32, message: &str) -> Self {
        let split = message
            .rsplit_once('_')
            .filter(|(_, tail)| !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|(name, tail)| Some((name, tail.parse::<u32>().ok()?)));
        match split {
            Some((name, value)) => Self { code, name: name.to_owned(), value: Some(value) },
            None => Self { code, name: message.to_owned(), value: None },
        }
    }

    /// Decode an `rpc_error` object, or `None` if `body` is something else.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let (head, rest) = body.split_first_chunk::<8>()?;
        let (id, code) = head.split_at(4);
        if id != tl::ID_RPC_ERROR.to_le_bytes() {
            return None;
        }
        let code = i32::from_le_bytes(code.try_into().ok()?);
        let (message, _) = tl::read_bytes(rest)?;
        Some(Self::new(code, &String::from_utf8_lossy(message)))
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "RPC {}: {}_{v}", self.code, self.name),
            None    => write!(f, "RPC {}: {}", self.code, self.name),
        }
    }
}

impl std::error::Error for RpcError {}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// How a single request failed.
///
/// This is what a [`RequestHandle`](crate::RequestHandle) resolves to on
/// failure. It is `Clone` because one server reply may fail every member of
/// a container at once.
#[derive(Clone, Debug, PartialEq)]
pub enum InvocationError {
    /// The server rejected the request.
    Rpc(RpcError),
    /// The payload alone exceeds the batch byte ceiling and was never sent.
    PayloadTooLarge {
        /// Payload length plus framer wrapper and per-message overhead.
        len:   usize,
        /// The configured ceiling.
        limit: usize,
    },
    /// The session was torn down before the request was answered.
    Disconnected(String),
    /// The request was dropped without being resolved (e.g. sender shut down).
    Dropped,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)          => write!(f, "{e}"),
            Self::PayloadTooLarge { len, limit } => {
                write!(f, "request payload is too big ({len} > {limit} bytes)")
            }
            Self::Disconnected(r) => write!(f, "disconnected ({r})"),
            Self::Dropped         => write!(f, "request dropped"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<RpcError> for InvocationError {
    fn from(e: RpcError) -> Self { Self::Rpc(e) }
}

// ─── SendError ────────────────────────────────────────────────────────────────

/// A failure of the flush loop itself, as opposed to a single request.
#[derive(Debug)]
pub enum SendError {
    /// The session framer failed while building a batch.
    Framing(FramingError),
    /// Writing a batch to the transport failed.
    Io(io::Error),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framing(e) => write!(f, "framing failed: {e}"),
            Self::Io(e)      => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Framing(e) => Some(e),
            Self::Io(e)      => Some(e),
        }
    }
}

impl From<FramingError> for SendError {
    fn from(e: FramingError) -> Self { Self::Framing(e) }
}

impl From<io::Error> for SendError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_splits_numeric_suffix() {
        let e = RpcError::new(420, "FLOOD_WAIT_30");
        assert_eq!(e.name, "FLOOD_WAIT");
        assert_eq!(e.value, Some(30));

        let e = RpcError::new(400, "PEER_ID_INVALID");
        assert_eq!(e.name, "PEER_ID_INVALID");
        assert_eq!(e.value, None);
    }

    #[test]
    fn decodes_rpc_error_objects() {
        let mut body = tl::ID_RPC_ERROR.to_le_bytes().to_vec();
        body.extend(420i32.to_le_bytes());
        tl::write_bytes(&mut body, b"FLOOD_WAIT_30");

        let e = RpcError::from_body(&body).unwrap();
        assert_eq!(e, RpcError { code: 420, name: "FLOOD_WAIT".into(), value: Some(30) });
        assert_eq!(e.to_string(), "RPC 420: FLOOD_WAIT_30");

        assert_eq!(RpcError::from_body(&tl::ping(1)), None);
        assert_eq!(RpcError::from_body(&body[..6]), None);
    }

    #[test]
    fn oversized_message_names_both_sizes() {
        let e = InvocationError::PayloadTooLarge { len: 150, limit: 100 };
        assert_eq!(e.to_string(), "request payload is too big (150 > 100 bytes)");
    }
}
