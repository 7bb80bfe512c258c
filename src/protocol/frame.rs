//! Frame type, frame codec, and trailer header-line format.
//!
//! Uses `bytes::Bytes` so decoded payloads share the input buffer.
//!
//! # Example
//!
//! ```
//! use channel_rpc::protocol::{decode_frames, encode_frame, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::data(Bytes::from_static(b"hello"));
//! let bytes = encode_frame(&frame).unwrap();
//!
//! let (frames, remaining) = decode_frames(Bytes::from(bytes)).unwrap();
//! assert_eq!(frames, vec![frame]);
//! assert!(remaining.is_empty());
//! ```

use bytes::Bytes;

use super::wire_format::{wire_length, FrameHeader, FrameKind, FRAME_HEADER_SIZE};
use super::Metadata;
use crate::error::{RpcError, Result};

/// A single flagged, length-prefixed wire unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: Bytes) -> Self {
        Self { kind, payload }
    }

    /// DATA frame wrapping a message body.
    pub fn data(payload: Bytes) -> Self {
        Self::new(FrameKind::Data, payload)
    }

    /// TRAILER frame carrying the given trailers.
    pub fn trailer(trailers: &Metadata) -> Self {
        Self::new(FrameKind::Trailer, Bytes::from(encode_trailers(trailers)))
    }

    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    #[inline]
    pub fn is_data(&self) -> bool {
        self.kind == FrameKind::Data
    }

    #[inline]
    pub fn is_trailer(&self) -> bool {
        self.kind == FrameKind::Trailer
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Cheap clone of the payload.
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Encoded size (header + payload).
    #[inline]
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }
}

/// Append the encoding of `frame` to `buf`.
pub fn encode_frame_into(buf: &mut Vec<u8>, frame: &Frame) -> Result<()> {
    let header = FrameHeader::new(frame.kind, wire_length(frame.payload.len())?);
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&frame.payload);
    Ok(())
}

/// Encode a single frame as a contiguous byte vector.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(frame.encoded_len());
    encode_frame_into(&mut buf, frame)?;
    Ok(buf)
}

/// Decode every complete frame in `buf`.
///
/// Returns the frames and the unconsumed tail. A buffer that ends mid-frame
/// is not an error: the partial frame is left in the tail so the caller can
/// decode again once more bytes are appended. An unknown flag byte is a
/// protocol error.
pub fn decode_frames(buf: Bytes) -> Result<(Vec<Frame>, Bytes)> {
    let mut frames = Vec::new();
    let mut offset = 0;

    while let Some(header) = FrameHeader::decode(&buf[offset..])? {
        let start = offset + FRAME_HEADER_SIZE;
        let end = start + header.payload_length as usize;
        if end > buf.len() {
            break;
        }
        frames.push(Frame::new(header.kind, buf.slice(start..end)));
        offset = end;
    }

    Ok((frames, buf.slice(offset..)))
}

/// Encode trailers as `key: value\r\n` lines.
pub fn encode_trailers(trailers: &Metadata) -> Vec<u8> {
    let mut out = String::new();
    for (key, value) in trailers {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.into_bytes()
}

/// Parse a trailer frame payload.
///
/// Lines are split on `\r\n`, then on the first `": "`. Empty lines and
/// lines without a separator are skipped.
pub fn parse_trailers(payload: &[u8]) -> Result<Metadata> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| RpcError::Protocol(format!("Trailer frame is not UTF-8: {}", e)))?;

    let mut trailers = Metadata::new();
    for line in text.split("\r\n") {
        if let Some((key, value)) = line.split_once(": ") {
            trailers.insert(key.to_string(), value.to_string());
        }
    }
    Ok(trailers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trailers() -> Metadata {
        let mut trailers = Metadata::new();
        trailers.insert("grpc-status".into(), "0".into());
        trailers.insert("grpc-message".into(), "ok: fine".into());
        trailers
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::data(Bytes::from_static(b"hello"));
        assert!(frame.is_data());
        assert!(!frame.is_trailer());
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(frame.encoded_len(), FRAME_HEADER_SIZE + 5);
    }

    #[test]
    fn test_encode_layout() {
        let bytes = encode_frame(&Frame::data(Bytes::from_static(b"hi"))).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn test_decode_single_frame() {
        let frame = Frame::trailer(&sample_trailers());
        let bytes = encode_frame(&frame).unwrap();

        let (frames, remaining) = decode_frames(Bytes::from(bytes)).unwrap();
        assert_eq!(frames, vec![frame]);
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_decode_multiple_frames() {
        let mut buf = Vec::new();
        for payload in [&b"first"[..], b"second", b""] {
            encode_frame_into(&mut buf, &Frame::data(Bytes::copy_from_slice(payload))).unwrap();
        }

        let (frames, remaining) = decode_frames(Bytes::from(buf)).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload(), b"first");
        assert_eq!(frames[1].payload(), b"second");
        assert!(frames[2].payload().is_empty());
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_truncated_prefixes_yield_no_frames() {
        let bytes = encode_frame(&Frame::data(Bytes::from_static(b"payload"))).unwrap();

        for cut in 0..bytes.len() {
            let input = Bytes::copy_from_slice(&bytes[..cut]);
            let (frames, remaining) = decode_frames(input.clone()).unwrap();
            assert!(frames.is_empty(), "cut at {} produced a frame", cut);
            assert_eq!(remaining, input);
        }
    }

    #[test]
    fn test_resume_after_more_bytes() {
        let first = encode_frame(&Frame::data(Bytes::from_static(b"one"))).unwrap();
        let second = encode_frame(&Frame::data(Bytes::from_static(b"two"))).unwrap();

        let mut buf = first.clone();
        buf.extend_from_slice(&second[..4]);

        let (frames, remaining) = decode_frames(Bytes::from(buf)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(remaining.len(), 4);

        let mut resumed = remaining.to_vec();
        resumed.extend_from_slice(&second[4..]);
        let (frames, remaining) = decode_frames(Bytes::from(resumed)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"two");
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_unknown_flag_is_fatal() {
        let buf = Bytes::from_static(&[2, 0, 0, 0, 0]);
        assert!(decode_frames(buf).is_err());
    }

    #[test]
    fn test_trailer_lines() {
        let encoded = encode_trailers(&sample_trailers());
        assert_eq!(
            encoded,
            b"grpc-message: ok: fine\r\ngrpc-status: 0\r\n".to_vec()
        );

        let parsed = parse_trailers(&encoded).unwrap();
        assert_eq!(parsed, sample_trailers());
    }

    #[test]
    fn test_parse_trailers_skips_malformed_lines() {
        let parsed = parse_trailers(b"grpc-status: 3\r\ngarbage\r\n\r\nx: y").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["grpc-status"], "3");
        assert_eq!(parsed["x"], "y");
    }
}
