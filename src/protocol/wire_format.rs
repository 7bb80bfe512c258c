//! Frame header encoding and decoding.
//!
//! Every frame starts with a 5-byte header:
//! ```text
//! ┌───────┬──────────────┬────────────────┐
//! │ Flag  │ Length       │ Payload        │
//! │ 1 byte│ 4 bytes      │ Length bytes   │
//! │       │ uint32 BE    │                │
//! └───────┴──────────────┴────────────────┘
//! ```
//!
//! Envelope-level length fields use the same big-endian `u32` encoding.

use crate::error::{RpcError, Result};

/// Frame header size in bytes (flag + length).
pub const FRAME_HEADER_SIZE: usize = 5;

/// Size of every big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Flag byte values.
pub mod flags {
    /// Frame carries a message body.
    pub const DATA: u8 = 0;
    /// Frame carries response trailers in header-line format.
    pub const TRAILER: u8 = 1;
}

/// Kind of a frame, taken from its flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Data,
    Trailer,
}

impl FrameKind {
    /// Parse a flag byte. Unknown values are a protocol error.
    pub fn from_flag(flag: u8) -> Result<Self> {
        match flag {
            flags::DATA => Ok(FrameKind::Data),
            flags::TRAILER => Ok(FrameKind::Trailer),
            other => Err(RpcError::Protocol(format!("Unknown frame flag {}", other))),
        }
    }

    /// Flag byte for this kind.
    #[inline]
    pub fn flag(self) -> u8 {
        match self {
            FrameKind::Data => flags::DATA,
            FrameKind::Trailer => flags::TRAILER,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame kind.
    pub kind: FrameKind,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl FrameHeader {
    pub fn new(kind: FrameKind, payload_length: u32) -> Self {
        Self {
            kind,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0] = self.kind.flag();
        buf[1..5].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes.
    ///
    /// Returns `Ok(None)` if the buffer is too short to hold a header, and an
    /// error as soon as the flag byte is present but unknown.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        let Some(&flag) = buf.first() else {
            return Ok(None);
        };
        let kind = FrameKind::from_flag(flag)?;
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        Ok(Some(Self {
            kind,
            payload_length: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
        }))
    }
}

/// Convert a length to its `u32` wire representation.
pub fn wire_length(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| RpcError::Protocol(format!("Length {} exceeds u32 range", len)))
}

/// Append a big-endian `u32` length prefix followed by `data`.
pub fn put_length_prefixed(buf: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    buf.extend_from_slice(&wire_length(data.len())?.to_be_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

/// Read a big-endian `u32` length prefix and the bytes it announces.
///
/// Returns the field bytes and the rest of the buffer. A prefix that
/// announces more bytes than remain is a protocol error.
pub fn take_length_prefixed<'a>(buf: &'a [u8], field: &str) -> Result<(&'a [u8], &'a [u8])> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Err(RpcError::Protocol(format!(
            "Truncated {} length: {} bytes available",
            field,
            buf.len()
        )));
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let rest = &buf[LENGTH_PREFIX_SIZE..];
    if rest.len() < len {
        return Err(RpcError::Protocol(format!(
            "{} length {} exceeds {} available bytes",
            field,
            len,
            rest.len()
        )));
    }
    Ok(rest.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = FrameHeader::new(FrameKind::Trailer, 0x01020304);
        let bytes = header.encode();

        assert_eq!(bytes, [0x01, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(FrameHeader::decode(&bytes).unwrap(), Some(header));
    }

    #[test]
    fn test_header_short_buffer_is_incomplete() {
        assert_eq!(FrameHeader::decode(&[]).unwrap(), None);
        assert_eq!(FrameHeader::decode(&[0, 0, 0]).unwrap(), None);
    }

    #[test]
    fn test_unknown_flag_rejected_early() {
        let err = FrameHeader::decode(&[7]).unwrap_err();
        assert!(err.to_string().contains("Unknown frame flag 7"));
    }

    #[test]
    fn test_length_prefixed_roundtrip() {
        let mut buf = Vec::new();
        put_length_prefixed(&mut buf, b"abc").unwrap();
        buf.extend_from_slice(b"tail");

        let (field, rest) = take_length_prefixed(&buf, "path").unwrap();
        assert_eq!(field, b"abc");
        assert_eq!(rest, b"tail");
    }

    #[test]
    fn test_length_prefixed_overrun_is_error() {
        let buf = [0, 0, 0, 9, b'x'];
        let err = take_length_prefixed(&buf, "headers").unwrap_err();
        assert!(err.to_string().contains("headers length 9 exceeds 1"));

        let err = take_length_prefixed(&[0, 0], "path").unwrap_err();
        assert!(err.to_string().contains("Truncated path length"));
    }
}
