//! Where finished batches go.
//!
//! The flush loop only needs to hand bytes to something. Encryption and the
//! socket live behind [`Transport`]; this module ships the two plain length
//! framings, useful against test servers and as building blocks.

use std::future::Future;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Sink for wire-ready batches.
pub trait Transport {
    /// Write one batch. Resolves once the bytes are handed to the OS.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}

// ─── Abridged ─────────────────────────────────────────────────────────────────

/// [MTProto Abridged] framing over any async writer.
///
/// Sends `0xef` once, then each packet as `[length/4 as 1 or 4 bytes][payload]`.
///
/// [MTProto Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
pub struct AbridgedTransport<W> {
    inner:     W,
    init_sent: bool,
}

impl<W> AbridgedTransport<W> {
    /// Wrap a writer; the init byte goes out with the first packet.
    pub fn new(inner: W) -> Self {
        Self { inner, init_sent: false }
    }

    /// Access the underlying writer.
    pub fn inner_mut(&mut self) -> &mut W { &mut self.inner }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W { self.inner }
}

impl<W: AsyncWrite + Unpin + Send> Transport for AbridgedTransport<W> {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() % 4 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("abridged packets must be 4-byte aligned, got {} bytes", data.len()),
            ));
        }
        if !self.init_sent {
            self.inner.write_all(&[0xef]).await?;
            self.init_sent = true;
        }
        let words = data.len() / 4;
        if words < 0x7f {
            self.inner.write_all(&[words as u8]).await?;
        } else {
            let b = [0x7f, (words & 0xff) as u8, ((words >> 8) & 0xff) as u8, ((words >> 16) & 0xff) as u8];
            self.inner.write_all(&b).await?;
        }
        self.inner.write_all(data).await?;
        self.inner.flush().await
    }
}

// ─── Intermediate ─────────────────────────────────────────────────────────────

/// [MTProto Intermediate] framing over any async writer.
///
/// Init bytes: `0xeeeeeeee`. Each packet is prefixed with its 4-byte
/// little-endian length.
///
/// [MTProto Intermediate]: https://core.telegram.org/mtproto/mtproto-transports#intermediate
pub struct IntermediateTransport<W> {
    inner:     W,
    init_sent: bool,
}

impl<W> IntermediateTransport<W> {
    /// Wrap a writer; the init bytes go out with the first packet.
    pub fn new(inner: W) -> Self {
        Self { inner, init_sent: false }
    }

    /// Access the underlying writer.
    pub fn inner_mut(&mut self) -> &mut W { &mut self.inner }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W { self.inner }
}

impl<W: AsyncWrite + Unpin + Send> Transport for IntermediateTransport<W> {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.init_sent {
            self.inner.write_all(&[0xee, 0xee, 0xee, 0xee]).await?;
            self.init_sent = true;
        }
        let len = u32::try_from(data.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "packet exceeds 4 GiB"))?;
        self.inner.write_all(&len.to_le_bytes()).await?;
        self.inner.write_all(data).await?;
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abridged_sends_init_byte_once() {
        let mut t = AbridgedTransport::new(Vec::new());
        t.send(&[0u8; 4]).await.unwrap();
        assert_eq!(t.inner_mut().as_slice(), &[0xef, 1, 0, 0, 0, 0]);

        let prev_len = t.inner_mut().len();
        t.send(&[0u8; 4]).await.unwrap();
        assert_eq!(t.inner_mut()[prev_len], 1, "init byte must only be sent once");
    }

    #[tokio::test]
    async fn abridged_long_header() {
        let mut t = AbridgedTransport::new(Vec::new());
        t.send(&vec![0u8; 0x80 * 4]).await.unwrap();
        assert_eq!(&t.inner_mut()[..5], &[0xef, 0x7f, 0x80, 0, 0]);
    }

    #[tokio::test]
    async fn abridged_rejects_unaligned_packets() {
        let mut t = AbridgedTransport::new(Vec::new());
        let err = t.send(&[1, 2, 3, 4, 5]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(t.inner_mut().is_empty(), "nothing may reach the stream");

        t.send(&[0u8; 8]).await.unwrap();
        assert_eq!(&t.inner_mut()[..2], &[0xef, 2]);
    }

    #[tokio::test]
    async fn intermediate_prefixes_length() {
        let mut t = IntermediateTransport::new(Vec::new());
        t.send(&[1, 2, 3, 4, 5, 6, 7, 8]).await.unwrap();
        let out = t.into_inner();
        assert_eq!(&out[..4], &[0xee; 4]);
        assert_eq!(&out[4..8], &8u32.to_le_bytes());
        assert_eq!(&out[8..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
