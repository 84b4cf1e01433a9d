//! Protocol encoding/decoding traits and helpers.
//!
//! Every multi-byte integer on the wire is big-endian. Strings are a fixed
//! 64 bytes, padded with spaces.

use bytes::{Buf, BufMut};

use crate::error::ProtoError;

/// Width of every string field on the wire.
pub const STRING_LEN: usize = 64;

/// Width of the level data payload carried by one map chunk.
pub const CHUNK_LEN: usize = 1024;

/// Encode a value onto a buffer.
pub trait ProtoEncode {
    fn proto_encode(&self, buf: &mut impl BufMut);
}

/// Decode a value from a buffer.
pub trait ProtoDecode: Sized {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError>;
}

/// Fail with `BufferTooShort` unless `needed` bytes remain.
pub fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), ProtoError> {
    if buf.remaining() < needed {
        return Err(ProtoError::BufferTooShort {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Write a fixed-width protocol string. Longer input is truncated and
/// anything outside printable ASCII becomes `?`.
pub fn write_string(buf: &mut impl BufMut, s: &str) {
    let mut written = 0;
    for ch in s.chars().take(STRING_LEN) {
        let byte = if ch.is_ascii() && !ch.is_ascii_control() {
            ch as u8
        } else {
            b'?'
        };
        buf.put_u8(byte);
        written += 1;
    }
    buf.put_bytes(b' ', STRING_LEN - written);
}

/// Read a fixed-width protocol string, trimming the space padding.
pub fn read_string(buf: &mut impl Buf) -> Result<String, ProtoError> {
    ensure_remaining(buf, STRING_LEN)?;
    let mut raw = [0u8; STRING_LEN];
    buf.copy_to_slice(&mut raw);
    let text: String = raw
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    Ok(text.trim_end_matches(' ').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn string_is_padded_to_fixed_width() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Notch");
        assert_eq!(buf.len(), STRING_LEN);
        assert_eq!(&buf[..5], b"Notch");
        assert!(buf[5..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn string_roundtrip_trims_padding() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Hello, classic!");
        let result = read_string(&mut buf.freeze()).unwrap();
        assert_eq!(result, "Hello, classic!");
    }

    #[test]
    fn long_string_is_truncated() {
        let long = "x".repeat(100);
        let mut buf = BytesMut::new();
        write_string(&mut buf, &long);
        assert_eq!(buf.len(), STRING_LEN);
    }

    #[test]
    fn non_ascii_is_replaced() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "é!");
        assert_eq!(&buf[..2], b"?!");
    }

    #[test]
    fn string_buffer_too_short() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Hello");
        let truncated = buf.freeze().slice(..10);
        assert!(read_string(&mut truncated.clone()).is_err());
    }
}
