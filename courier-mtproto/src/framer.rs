//! The seam between the batching engine and whoever owns message ids.

use std::{fmt, io};

use crate::message::MessageId;

/// Errors raised while framing a single message.
#[derive(Debug)]
pub enum FramingError {
    /// The body does not fit the 32-bit length field of the envelope.
    BodyTooLarge(usize),
    /// Compressing the body into `gzip_packed` failed.
    Compression(io::Error),
    /// A collaborator-specific failure.
    Other(String),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BodyTooLarge(n) => write!(f, "message body of {n} bytes does not fit the envelope"),
            Self::Compression(e)  => write!(f, "gzip_packed compression failed: {e}"),
            Self::Other(s)        => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for FramingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Compression(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FramingError {
    fn from(e: io::Error) -> Self { Self::Compression(e) }
}

/// Exclusive authority over message ids and sequence numbers.
///
/// Every framed unit, the container wrapper included, goes through
/// [`write_data_as_message`](Self::write_data_as_message) exactly once and in
/// the order the ids must take effect.
pub trait SessionFramer {
    /// Append the envelope for `data` to `buf` and return the id it was given.
    ///
    /// `after` asks the server to run this message only once the message it
    /// names has been processed. It is an opaque hint; the framer decides how
    /// to encode it.
    fn write_data_as_message(
        &mut self,
        buf:             &mut Vec<u8>,
        data:            &[u8],
        content_related: bool,
        after:           Option<MessageId>,
    ) -> Result<MessageId, FramingError>;

    /// Bytes this framer adds around a payload that depends on `after`,
    /// before any compression.
    ///
    /// Batch builders charge this against their byte ceiling. Compression
    /// only ever shrinks a body, so it needs no allowance.
    fn wrapper_len(&self, _after: Option<MessageId>) -> usize { 0 }
}

impl<F: SessionFramer + ?Sized> SessionFramer for Box<F> {
    fn write_data_as_message(
        &mut self,
        buf:             &mut Vec<u8>,
        data:            &[u8],
        content_related: bool,
        after:           Option<MessageId>,
    ) -> Result<MessageId, FramingError> {
        (**self).write_data_as_message(buf, data, content_related, after)
    }

    fn wrapper_len(&self, after: Option<MessageId>) -> usize {
        (**self).wrapper_len(after)
    }
}
