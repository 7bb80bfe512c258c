//! Error types for channel-rpc.

use std::time::Duration;

use thiserror::Error;

use crate::status::Status;

/// Main error type for all channel-rpc operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on a stream-backed channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (envelope headers, reflection).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Base64 decode error (reflection descriptors).
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Corrupt frame or envelope bytes.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A response buffer ended with bytes that do not form a complete frame.
    #[error("Incomplete response: {remaining} trailing bytes")]
    IncompleteResponse {
        /// Number of unconsumed bytes after frame decoding.
        remaining: usize,
    },

    /// Typed RPC error carried in response trailers.
    #[error("{0}")]
    Status(Status),

    /// No response arrived within the call timeout.
    #[error("Request {request_id} timed out after {timeout:?}")]
    Timeout {
        /// Correlation ID of the call.
        request_id: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// A call was issued after the transport was closed.
    #[error("Transport closed")]
    TransportClosed,

    /// A pending call was rejected because the transport closed.
    #[error("Connection closed")]
    Closed,

    /// Request headers are missing `x-request-id`.
    #[error("Missing x-request-id header")]
    MissingRequestId,

    /// A unary call resolved with zero or several messages.
    #[error("Expected exactly one response message, got {0}")]
    UnexpectedMessageCount(usize),

    /// Too many calls are already waiting for a response.
    #[error("Too many pending calls ({0})")]
    TooManyPendingCalls(usize),

    /// Malformed protobuf descriptor bytes.
    #[error("Protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    /// Inconsistent descriptor set (e.g. a symbol defined twice).
    #[error("Descriptor error: {0}")]
    Descriptor(String),
}

impl RpcError {
    /// Return the typed status if this is an RPC status error.
    pub fn status(&self) -> Option<&Status> {
        match self {
            RpcError::Status(status) => Some(status),
            _ => None,
        }
    }
}

impl From<Status> for RpcError {
    fn from(status: Status) -> Self {
        RpcError::Status(status)
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
