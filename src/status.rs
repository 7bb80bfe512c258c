//! gRPC status codes and the typed RPC error.
//!
//! The numeric values are part of the wire contract and match the standard
//! gRPC enumeration exactly.

use std::fmt;

use crate::error::RpcError;
use crate::protocol::{Metadata, GRPC_MESSAGE, GRPC_STATUS};

/// Message used when a trailer set carries no `grpc-message`.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Message sent for untyped handler failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// gRPC status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// All codes in numeric order.
    pub const ALL: [Code; 17] = [
        Code::Ok,
        Code::Cancelled,
        Code::Unknown,
        Code::InvalidArgument,
        Code::DeadlineExceeded,
        Code::NotFound,
        Code::AlreadyExists,
        Code::PermissionDenied,
        Code::ResourceExhausted,
        Code::FailedPrecondition,
        Code::Aborted,
        Code::OutOfRange,
        Code::Unimplemented,
        Code::Internal,
        Code::Unavailable,
        Code::DataLoss,
        Code::Unauthenticated,
    ];

    /// Look up a code by its numeric value.
    pub fn from_i32(value: i32) -> Option<Code> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Code::ALL.get(idx).copied())
    }

    /// Numeric wire value.
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Symbolic name, e.g. `UNIMPLEMENTED`.
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reverse-look-up the symbolic name of a numeric status.
///
/// Values outside the table yield `None`.
pub fn status_name(code: i32) -> Option<&'static str> {
    Code::from_i32(code).map(Code::as_str)
}

/// Typed RPC error: status code, message, and the full trailer set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
    trailers: Metadata,
}

impl Status {
    /// Create a status with the given code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            trailers: Metadata::new(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Attach extra trailers (e.g. application metadata) to this status.
    pub fn with_trailers(mut self, trailers: Metadata) -> Self {
        self.trailers = trailers;
        self
    }

    #[inline]
    pub fn code(&self) -> Code {
        self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn trailers(&self) -> &Metadata {
        &self.trailers
    }

    /// Extract a status from response trailers.
    ///
    /// A missing or unparsable `grpc-status` maps to UNKNOWN, and a missing
    /// `grpc-message` to "Unknown error". Numeric values outside the table
    /// also map to UNKNOWN.
    pub fn from_trailers(trailers: &Metadata) -> Self {
        let code = trailers
            .get(GRPC_STATUS)
            .and_then(|s| s.trim().parse::<i32>().ok())
            .and_then(Code::from_i32)
            .unwrap_or(Code::Unknown);
        let message = trailers
            .get(GRPC_MESSAGE)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string());
        Self {
            code,
            message,
            trailers: trailers.clone(),
        }
    }

    /// Render this status as a trailer set.
    ///
    /// Extra trailers are kept; `grpc-status` and `grpc-message` always win.
    pub fn to_trailers(&self) -> Metadata {
        let mut trailers = self.trailers.clone();
        trailers.insert(GRPC_STATUS.to_string(), self.code.as_i32().to_string());
        if self.message.is_empty() {
            trailers.remove(GRPC_MESSAGE);
        } else {
            trailers.insert(GRPC_MESSAGE.to_string(), self.message.clone());
        }
        trailers
    }

    /// Map any error into the status that may be sent on the wire.
    ///
    /// Typed statuses pass through verbatim. Everything else becomes
    /// INTERNAL with a generic message.
    pub fn from_error(err: &RpcError) -> Self {
        match err {
            RpcError::Status(status) => status.clone(),
            _ => Status::internal(INTERNAL_ERROR_MESSAGE),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC error {} ({}): {}", self.code.as_i32(), self.code, self.message)
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_values_match_grpc() {
        assert_eq!(Code::Ok.as_i32(), 0);
        assert_eq!(Code::InvalidArgument.as_i32(), 3);
        assert_eq!(Code::NotFound.as_i32(), 5);
        assert_eq!(Code::ResourceExhausted.as_i32(), 8);
        assert_eq!(Code::Unimplemented.as_i32(), 12);
        assert_eq!(Code::Internal.as_i32(), 13);
        assert_eq!(Code::Unauthenticated.as_i32(), 16);

        for (idx, code) in Code::ALL.iter().enumerate() {
            assert_eq!(code.as_i32(), idx as i32);
        }
    }

    #[test]
    fn test_from_i32_out_of_range() {
        assert_eq!(Code::from_i32(12), Some(Code::Unimplemented));
        assert_eq!(Code::from_i32(17), None);
        assert_eq!(Code::from_i32(-1), None);
    }

    #[test]
    fn test_status_name() {
        assert_eq!(status_name(0), Some("OK"));
        assert_eq!(status_name(12), Some("UNIMPLEMENTED"));
        assert_eq!(status_name(16), Some("UNAUTHENTICATED"));
        assert_eq!(status_name(99), None);
    }

    #[test]
    fn test_from_trailers_defaults() {
        let status = Status::from_trailers(&Metadata::new());
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn test_from_trailers_parses_code_and_message() {
        let mut trailers = Metadata::new();
        trailers.insert(GRPC_STATUS.into(), "5".into());
        trailers.insert(GRPC_MESSAGE.into(), "no such thing".into());
        trailers.insert("x-extra".into(), "1".into());

        let status = Status::from_trailers(&trailers);
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "no such thing");
        assert_eq!(status.trailers().get("x-extra").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_to_trailers_roundtrip() {
        let status = Status::unimplemented("method not found: /a.B/C");
        let trailers = status.to_trailers();
        assert_eq!(trailers[GRPC_STATUS], "12");
        assert_eq!(trailers[GRPC_MESSAGE], "method not found: /a.B/C");

        let back = Status::from_trailers(&trailers);
        assert_eq!(back.code(), Code::Unimplemented);
        assert_eq!(back.message(), status.message());
    }

    #[test]
    fn test_from_error_genericizes_untyped() {
        let io = RpcError::Io(std::io::Error::new(std::io::ErrorKind::Other, "secret path /etc"));
        let status = Status::from_error(&io);
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), INTERNAL_ERROR_MESSAGE);

        let typed = RpcError::Status(Status::not_found("gone"));
        let status = Status::from_error(&typed);
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "gone");
    }
}
