//! Request and response envelopes.
//!
//! Request layout:
//! ```text
//! [u32 path_len][path utf-8][u32 headers_len][headers JSON][DATA frame]
//! ```
//!
//! Response layout:
//! ```text
//! [u32 headers_len][headers JSON][DATA frame]*[TRAILER frame]
//! ```
//!
//! All length fields are big-endian. A buffer must hold exactly one complete
//! envelope; reassembly across channel messages happens in the channel.

use bytes::Bytes;

use super::frame::{decode_frames, encode_frame_into, parse_trailers, Frame};
use super::wire_format::{put_length_prefixed, take_length_prefixed, FrameKind};
use super::{Metadata, GRPC_MESSAGE, GRPC_STATUS, REQUEST_ID_HEADER};
use crate::error::{RpcError, Result};
use crate::status::{Code, Status};

/// One call's request: method path, metadata, and serialized message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// `/package.Service/Method`.
    pub path: String,
    /// Request metadata; must carry `x-request-id` when sent.
    pub headers: Metadata,
    /// Opaque request body.
    pub message: Bytes,
}

impl RequestEnvelope {
    pub fn new(path: impl Into<String>, headers: Metadata, message: Bytes) -> Self {
        Self {
            path: path.into(),
            headers,
            message,
        }
    }

    /// The correlation ID, if present.
    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(REQUEST_ID_HEADER).map(String::as_str)
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let headers = serde_json::to_vec(&self.headers)?;
        let mut buf = Vec::with_capacity(
            8 + self.path.len() + headers.len() + 5 + self.message.len(),
        );
        put_length_prefixed(&mut buf, self.path.as_bytes())?;
        put_length_prefixed(&mut buf, &headers)?;
        encode_frame_into(&mut buf, &Frame::data(self.message.clone()))?;
        Ok(buf)
    }

    /// Decode from wire bytes.
    ///
    /// The buffer must contain exactly one DATA frame after the headers.
    pub fn decode(buf: Bytes) -> Result<Self> {
        let (path, rest) = take_length_prefixed(&buf, "path")?;
        let path = std::str::from_utf8(path)
            .map_err(|e| RpcError::Protocol(format!("Path is not UTF-8: {}", e)))?
            .to_string();
        let (headers, rest) = take_length_prefixed(rest, "headers")?;
        let headers: Metadata = serde_json::from_slice(headers)?;

        let body = buf.slice(buf.len() - rest.len()..);
        let (frames, remaining) = decode_frames(body)?;
        if !remaining.is_empty() {
            return Err(RpcError::Protocol(format!(
                "Incomplete request: {} trailing bytes",
                remaining.len()
            )));
        }

        let mut frames = frames.into_iter();
        let message = match (frames.next(), frames.next()) {
            (Some(frame), None) if frame.is_data() => frame.into_payload(),
            (Some(frame), None) => {
                return Err(RpcError::Protocol(format!(
                    "Request carries a {:?} frame instead of DATA",
                    frame.kind()
                )))
            }
            (None, _) => return Err(RpcError::Protocol("Request has no DATA frame".into())),
            (Some(_), Some(_)) => {
                return Err(RpcError::Protocol(
                    "Request carries more than one frame".into(),
                ))
            }
        };

        Ok(Self {
            path,
            headers,
            message,
        })
    }
}

/// A response: metadata, zero or more messages, and status trailers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub headers: Metadata,
    pub messages: Vec<Bytes>,
    pub trailers: Metadata,
}

impl ResponseEnvelope {
    /// Empty response with `grpc-status: 0`.
    pub fn ok() -> Self {
        let mut trailers = Metadata::new();
        trailers.insert(GRPC_STATUS.to_string(), Code::Ok.as_i32().to_string());
        Self {
            headers: Metadata::new(),
            messages: Vec::new(),
            trailers,
        }
    }

    /// Successful unary response carrying one message.
    pub fn unary(message: Bytes) -> Self {
        let mut response = Self::ok();
        response.messages.push(message);
        response
    }

    /// Error response with no messages.
    pub fn from_status(status: &Status) -> Self {
        Self {
            headers: Metadata::new(),
            messages: Vec::new(),
            trailers: status.to_trailers(),
        }
    }

    /// Append one streamed message.
    pub fn push_message(&mut self, message: Bytes) -> &mut Self {
        self.messages.push(message);
        self
    }

    /// Set a response header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Replace the outcome trailers with `status`, keeping any messages.
    pub fn with_status(mut self, status: &Status) -> Self {
        self.trailers.extend(status.to_trailers());
        if status.message().is_empty() {
            self.trailers.remove(GRPC_MESSAGE);
        }
        self
    }

    /// The correlation ID echoed in the headers, if present.
    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(REQUEST_ID_HEADER).map(String::as_str)
    }

    /// True if `grpc-status` is present and not `"0"`.
    pub fn is_error(&self) -> bool {
        self.trailers
            .get(GRPC_STATUS)
            .is_some_and(|status| status != "0")
    }

    /// The status carried by the trailers.
    pub fn status(&self) -> Status {
        Status::from_trailers(&self.trailers)
    }

    /// Convert into `Err(Status)` if this is an error response.
    pub fn into_result(self) -> Result<Self> {
        if self.is_error() {
            Err(RpcError::Status(self.status()))
        } else {
            Ok(self)
        }
    }

    /// Encode to wire bytes as one contiguous buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let headers = serde_json::to_vec(&self.headers)?;
        let body_len: usize = self.messages.iter().map(|m| m.len() + 5).sum();
        let mut buf = Vec::with_capacity(4 + headers.len() + body_len + 64);
        put_length_prefixed(&mut buf, &headers)?;
        for message in &self.messages {
            encode_frame_into(&mut buf, &Frame::data(message.clone()))?;
        }
        encode_frame_into(&mut buf, &Frame::trailer(&self.trailers))?;
        Ok(buf)
    }

    /// Decode from wire bytes.
    ///
    /// Leftover bytes after the last complete frame, or a body with no
    /// trailer frame, are an [`RpcError::IncompleteResponse`]. More than one
    /// trailer frame, or a DATA frame after the trailer, is a protocol error.
    pub fn decode(buf: Bytes) -> Result<Self> {
        let (headers, rest) = take_length_prefixed(&buf, "headers")?;
        let headers: Metadata = serde_json::from_slice(headers)?;

        let body = buf.slice(buf.len() - rest.len()..);
        let (frames, remaining) = decode_frames(body)?;
        if !remaining.is_empty() {
            return Err(RpcError::IncompleteResponse {
                remaining: remaining.len(),
            });
        }

        let mut messages = Vec::new();
        let mut trailers: Option<Metadata> = None;
        for frame in frames {
            match frame.kind() {
                FrameKind::Data if trailers.is_some() => {
                    return Err(RpcError::Protocol("DATA frame after trailer".into()));
                }
                FrameKind::Data => messages.push(frame.into_payload()),
                FrameKind::Trailer if trailers.is_some() => {
                    return Err(RpcError::Protocol(
                        "Response carries more than one trailer frame".into(),
                    ));
                }
                FrameKind::Trailer => trailers = Some(parse_trailers(frame.payload())?),
            }
        }

        let trailers = trailers.ok_or(RpcError::IncompleteResponse { remaining: 0 })?;
        Ok(Self {
            headers,
            messages,
            trailers,
        })
    }

    /// Read only the `x-request-id` header of an encoded response.
    ///
    /// Lets a caller fail the matching call when the rest of the response
    /// does not decode.
    pub fn peek_request_id(buf: &[u8]) -> Option<String> {
        let (headers, _) = take_length_prefixed(buf, "headers").ok()?;
        let mut headers: Metadata = serde_json::from_slice(headers).ok()?;
        headers.remove(REQUEST_ID_HEADER)
    }
}
