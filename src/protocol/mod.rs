//! Protocol module - frame codec, trailer format, and envelopes.
//!
//! This module implements the gRPC-Web style wire format:
//! - 5-byte frame header (flag + big-endian length)
//! - `key: value\r\n` trailer lines
//! - Request and response envelopes built from frames

use std::collections::BTreeMap;

mod envelope;
mod frame;
mod wire_format;

pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use frame::{
    decode_frames, encode_frame, encode_frame_into, encode_trailers, parse_trailers, Frame,
};
pub use wire_format::{
    flags, put_length_prefixed, take_length_prefixed, wire_length, FrameHeader, FrameKind,
    FRAME_HEADER_SIZE, LENGTH_PREFIX_SIZE,
};

/// Header and trailer metadata: string keys to string values.
pub type Metadata = BTreeMap<String, String>;

/// Correlation header echoed by every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Trailer carrying the numeric status.
pub const GRPC_STATUS: &str = "grpc-status";

/// Trailer carrying the status message.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Content type header.
pub const CONTENT_TYPE: &str = "content-type";
