//! The handful of MTProto service constructors the framing layer writes
//! itself, plus TL `bytes` encoding.
//!
//! Encoding follows the [MTProto Binary Serialization] rules.
//!
//! [MTProto Binary Serialization]: https://core.telegram.org/mtproto/serialize

use std::borrow::Cow;
use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::GzEncoder;

use crate::message::MessageId;

// ─── Constructor IDs ─────────────────────────────────────────────────────────

/// `msg_container#73f1f8dc messages:vector<message> = MessageContainer`
pub const ID_MSG_CONTAINER: u32 = 0x73f1f8dc;
/// `gzip_packed#3072cfa1 packed_data:bytes = Object`
pub const ID_GZIP_PACKED: u32 = 0x3072cfa1;
/// `invokeAfterMsg#cb9f372d {X:Type} msg_id:long query:!X = X`
pub const ID_INVOKE_AFTER_MSG: u32 = 0xcb9f372d;
/// `rpc_error#2144ca19 error_code:int error_message:string = RpcError`
pub const ID_RPC_ERROR: u32 = 0x2144ca19;
/// `ping#7abe77ec ping_id:long = Pong`
pub const ID_PING: u32 = 0x7abe77ec;

/// Constructor id plus `msg_id` in front of an `invokeAfterMsg` query.
pub const INVOKE_AFTER_MSG_HEADER_LEN: usize = 4 + 8;

/// Content-related bodies at or below this size are never compressed.
pub const GZIP_THRESHOLD: usize = 512;

// ─── bytes ───────────────────────────────────────────────────────────────────

/// TL string encoding: a length-prefixed, 4-byte aligned byte string.
///
/// * If `len ≤ 253`: `[len as u8][data][0-padding to align to 4 bytes]`
/// * If `len ≥ 254`: `[0xfe][len as 3 LE bytes][data][0-padding]`
pub fn write_bytes(buf: &mut impl Extend<u8>, data: &[u8]) {
    let len = data.len();
    let header_len = if len <= 253 {
        buf.extend([len as u8]);
        1
    } else {
        buf.extend([
            0xfe,
            (len & 0xff) as u8,
            ((len >> 8) & 0xff) as u8,
            ((len >> 16) & 0xff) as u8,
        ]);
        4
    };
    let padding = (4 - ((header_len + len) % 4)) % 4;
    buf.extend(data.iter().copied());
    buf.extend(std::iter::repeat_n(0u8, padding));
}

/// Read a TL `bytes` value from the front of `data`.
///
/// Returns the payload and the number of bytes consumed including padding.
pub fn read_bytes(data: &[u8]) -> Option<(&[u8], usize)> {
    let first = *data.first()?;
    let (len, start) = if first < 254 {
        (first as usize, 1)
    } else {
        if data.len() < 4 { return None; }
        (data[1] as usize | (data[2] as usize) << 8 | (data[3] as usize) << 16, 4)
    };
    let end = start + len;
    if data.len() < end {
        return None;
    }
    let consumed = end + (4 - end % 4) % 4;
    Some((&data[start..end], consumed.min(data.len())))
}

// ─── Wrappers ────────────────────────────────────────────────────────────────

/// Wrap `query` so the server executes it only after `msg_id`.
pub fn invoke_after_msg(msg_id: MessageId, query: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(INVOKE_AFTER_MSG_HEADER_LEN + query.len());
    buf.extend(ID_INVOKE_AFTER_MSG.to_le_bytes());
    buf.extend(msg_id.0.to_le_bytes());
    buf.extend_from_slice(query);
    buf
}

/// Serialize a `ping` request.
pub fn ping(ping_id: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12);
    buf.extend(ID_PING.to_le_bytes());
    buf.extend(ping_id.to_le_bytes());
    buf
}

/// Compress `data` into a `gzip_packed` object.
pub fn gzip_pack(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)?;
    let packed = enc.finish()?;

    let mut buf = Vec::with_capacity(4 + 4 + packed.len() + 3);
    buf.extend(ID_GZIP_PACKED.to_le_bytes());
    write_bytes(&mut buf, &packed);
    Ok(buf)
}

/// Replace `data` with its `gzip_packed` form when that is worth it.
///
/// Only content-related bodies above [`GZIP_THRESHOLD`] are considered, and
/// the packed form is used only if it is actually smaller.
pub fn gzip_if_smaller(content_related: bool, data: &[u8]) -> io::Result<Cow<'_, [u8]>> {
    if content_related && data.len() > GZIP_THRESHOLD {
        let packed = gzip_pack(data)?;
        if packed.len() < data.len() {
            return Ok(Cow::Owned(packed));
        }
    }
    Ok(Cow::Borrowed(data))
}

/// Inflate a `gzip_packed` object back into the wrapped body.
///
/// Servers use either gzip or raw zlib streams; both are accepted.
pub fn gzip_unpack(body: &[u8]) -> io::Result<Vec<u8>> {
    let invalid = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, msg.to_owned());

    if body.len() < 4 || u32::from_le_bytes([body[0], body[1], body[2], body[3]]) != ID_GZIP_PACKED {
        return Err(invalid("not a gzip_packed object"));
    }
    let (packed, _) = read_bytes(&body[4..]).ok_or_else(|| invalid("truncated gzip_packed"))?;

    let mut out = Vec::new();
    if GzDecoder::new(packed).read_to_end(&mut out).is_ok() && !out.is_empty() {
        return Ok(out);
    }
    out.clear();
    ZlibDecoder::new(packed).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bytes_are_padded() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &[1, 2]);
        assert_eq!(buf, vec![2, 1, 2, 0]);
        assert_eq!(read_bytes(&buf), Some((&[1u8, 2][..], 4)));
    }

    #[test]
    fn long_bytes_use_wide_header() {
        let data = vec![7u8; 300];
        let mut buf = Vec::new();
        write_bytes(&mut buf, &data);
        assert_eq!(buf[0], 0xfe);
        assert_eq!(buf.len() % 4, 0);
        let (back, used) = read_bytes(&buf).unwrap();
        assert_eq!(back, &data[..]);
        assert_eq!(used, buf.len());
    }

    #[test]
    fn small_or_unrelated_bodies_stay_plain() {
        let data = vec![0u8; 2048];
        assert!(matches!(gzip_if_smaller(false, &data).unwrap(), Cow::Borrowed(_)));
        assert!(matches!(gzip_if_smaller(true, &data[..100]).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn compressible_body_is_packed_and_recoverable() {
        let data = vec![0u8; 4096];
        let packed = gzip_if_smaller(true, &data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(&packed[..4], &ID_GZIP_PACKED.to_le_bytes());
        assert_eq!(gzip_unpack(&packed).unwrap(), data);
    }

    #[test]
    fn invoke_after_layout() {
        let b = invoke_after_msg(MessageId(0x1122), &[9, 9, 9, 9]);
        assert_eq!(&b[..4], &ID_INVOKE_AFTER_MSG.to_le_bytes());
        assert_eq!(i64::from_le_bytes(b[4..12].try_into().unwrap()), 0x1122);
        assert_eq!(&b[INVOKE_AFTER_MSG_HEADER_LEN..], &[9, 9, 9, 9]);
    }
}
