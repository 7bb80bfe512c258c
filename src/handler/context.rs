//! Request context for handlers.
//!
//! Carries per-call information that is not part of the request envelope
//! itself: the correlation ID the response will echo and when the request
//! arrived.

use std::time::{Duration, Instant};

use crate::protocol::Metadata;

/// Context passed to request handlers.
///
/// `RequestContext` is `Clone` and can be moved into spawned tasks.
#[derive(Debug, Clone)]
pub struct RequestContext {
    path: String,
    request_id: String,
    headers: Metadata,
    received_at: Instant,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, request_id: impl Into<String>, headers: Metadata) -> Self {
        Self {
            path: path.into(),
            request_id: request_id.into(),
            headers,
            received_at: Instant::now(),
        }
    }

    /// Method path being invoked.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Correlation ID of this call (empty if the caller sent none).
    #[inline]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Request metadata.
    #[inline]
    pub fn headers(&self) -> &Metadata {
        &self.headers
    }

    /// Look up a single request header.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Time since the request was decoded.
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }
}
