//! Caller side: issue calls and correlate their responses.
//!
//! The [`RpcClient`] multiplexes any number of concurrent calls over one
//! channel. Each call is keyed by its `x-request-id`; a reader task matches
//! every inbound response to its pending call, so responses may arrive in
//! any order.
//!
//! ```text
//!   call() ──► pending.insert(id) ──► channel.send(request)
//!                                            │
//!   reader task ◄── channel events ◄─────────┘
//!       └─► pending.remove(id) ──► resolve call()
//! ```
//!
//! Every pending call ends exactly once: its response arrives, its timeout
//! fires, or the transport closes.
//!
//! # Example
//!
//! ```ignore
//! use channel_rpc::codec::JsonCodec;
//! use channel_rpc::{CallOptions, ClientConfig, RpcClient};
//!
//! let client = RpcClient::new(channel, ClientConfig::default());
//! let doubled: i64 = client
//!     .unary::<JsonCodec, _, _>("/math.Calc/Double", &21, CallOptions::default())
//!     .await?;
//! client.close();
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::Codec;
use crate::error::{RpcError, Result};
use crate::protocol::{Metadata, RequestEnvelope, ResponseEnvelope, REQUEST_ID_HEADER};
use crate::transport::{Channel, ChannelEvent, ChannelSender};

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of calls awaiting a response.
pub const DEFAULT_MAX_PENDING_CALLS: usize = 8192;

/// Callback for responses no pending call is waiting for.
pub type UnmatchedHook = Arc<dyn Fn(ResponseEnvelope) + Send + Sync>;

/// Generate a fresh correlation ID (random UUID v4).
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Timeout applied when a call does not set its own.
    pub default_timeout: Duration,
    /// Calls allowed to await a response at once.
    pub max_pending_calls: usize,
    on_unmatched: Option<UnmatchedHook>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_CALL_TIMEOUT,
            max_pending_calls: DEFAULT_MAX_PENDING_CALLS,
            on_unmatched: None,
        }
    }
}

impl ClientConfig {
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn max_pending_calls(mut self, limit: usize) -> Self {
        self.max_pending_calls = limit;
        self
    }

    /// Handle responses that match no pending call (late, duplicate, or
    /// missing `x-request-id`). Without a hook they are logged and dropped.
    pub fn on_unmatched<F>(mut self, hook: F) -> Self
    where
        F: Fn(ResponseEnvelope) + Send + Sync + 'static,
    {
        self.on_unmatched = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("default_timeout", &self.default_timeout)
            .field("max_pending_calls", &self.max_pending_calls)
            .field("on_unmatched", &self.on_unmatched.is_some())
            .finish()
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides [`ClientConfig::default_timeout`].
    pub timeout: Option<Duration>,
    /// Extra request headers. Headers already on the envelope win.
    pub headers: Metadata,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

struct PendingCall {
    created_at: Instant,
    tx: oneshot::Sender<Result<ResponseEnvelope>>,
}

/// State shared between the client handle and its reader task.
struct Shared {
    /// Calls awaiting a response, keyed by `x-request-id`.
    pending: Mutex<HashMap<String, PendingCall>>,
    /// Set under the `pending` lock so no call registers after close.
    closed: AtomicBool,
    sender: Arc<dyn ChannelSender>,
    config: ClientConfig,
}

impl Shared {
    fn register(&self, request_id: &str) -> Result<oneshot::Receiver<Result<ResponseEnvelope>>> {
        let mut pending = self.pending.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::TransportClosed);
        }
        if pending.len() >= self.config.max_pending_calls {
            return Err(RpcError::TooManyPendingCalls(pending.len()));
        }
        if pending.contains_key(request_id) {
            return Err(RpcError::Protocol(format!(
                "Request ID {} is already in flight",
                request_id
            )));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(
            request_id.to_string(),
            PendingCall {
                created_at: Instant::now(),
                tx,
            },
        );
        Ok(rx)
    }

    fn remove(&self, request_id: &str) -> Option<PendingCall> {
        self.pending.lock().remove(request_id)
    }

    /// Mark closed and reject every pending call.
    ///
    /// Returns false if the transport was already closed. Pending calls are
    /// rejected after the lock is released.
    fn shutdown(&self) -> bool {
        let drained = {
            let mut pending = self.pending.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *pending)
        };

        let rejected = drained.len();
        for (_, call) in drained {
            let _ = call.tx.send(Err(RpcError::Closed));
        }
        if rejected > 0 {
            tracing::debug!(pending = rejected, "Rejected pending calls on close");
        }
        true
    }

    fn handle_message(&self, bytes: Bytes) {
        let response = match ResponseEnvelope::decode(bytes.clone()) {
            Ok(r) => r,
            Err(e) => {
                let call = ResponseEnvelope::peek_request_id(&bytes).and_then(|id| self.remove(&id));
                match call {
                    Some(call) => {
                        tracing::warn!("Failing call on undecodable response: {}", e);
                        let _ = call.tx.send(Err(e));
                    }
                    None => tracing::warn!("Dropping undecodable response: {}", e),
                }
                return;
            }
        };

        let call = match response.request_id() {
            Some(id) => self.remove(id),
            None => {
                tracing::warn!("Response without x-request-id cannot be delivered");
                None
            }
        };

        match call {
            Some(call) => {
                tracing::debug!(
                    request_id = ?response.request_id(),
                    elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                    "Call resolved"
                );
                // The caller gave up between removal and delivery.
                if let Err(Ok(response)) = call.tx.send(Ok(response)) {
                    self.unmatched(response);
                }
            }
            None => self.unmatched(response),
        }
    }

    fn unmatched(&self, response: ResponseEnvelope) {
        match &self.config.on_unmatched {
            Some(hook) => hook(response),
            None => {
                if let Some(id) = response.request_id() {
                    tracing::warn!(request_id = %id, "Dropping response for unknown call");
                }
            }
        }
    }
}

/// Removes the pending entry if the call future is dropped or times out.
struct PendingGuard<'a> {
    shared: &'a Shared,
    request_id: &'a str,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.remove(self.request_id);
        }
    }
}

/// A call correlator bound to one channel.
///
/// Must be created inside a tokio runtime. Share it as `Arc<RpcClient>` to
/// issue calls from several tasks.
pub struct RpcClient {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Take over a channel and start correlating its responses.
    pub fn new(channel: Channel, config: ClientConfig) -> Self {
        let (sender, events) = channel.into_parts();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            sender,
            config,
        });
        let reader = tokio::spawn(read_loop(shared.clone(), events));
        Self { shared, reader }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Send a request and wait for its response envelope.
    ///
    /// The envelope must carry `x-request-id`. Error statuses are returned
    /// as a normal envelope; use [`unary`](Self::unary) or
    /// [`ResponseEnvelope::into_result`] to turn them into errors.
    pub async fn call(&self, mut request: RequestEnvelope, options: CallOptions) -> Result<ResponseEnvelope> {
        for (key, value) in options.headers {
            request.headers.entry(key).or_insert(value);
        }
        let request_id = request
            .request_id()
            .ok_or(RpcError::MissingRequestId)?
            .to_string();
        let timeout = options.timeout.unwrap_or(self.shared.config.default_timeout);
        let encoded = Bytes::from(request.encode()?);

        let rx = self.shared.register(&request_id)?;
        let mut guard = PendingGuard {
            shared: &self.shared,
            request_id: &request_id,
            armed: true,
        };

        self.shared.sender.send(encoded)?;
        tracing::debug!(request_id = %request_id, path = %request.path, "Call sent");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => {
                guard.disarm();
                outcome
            }
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => {
                drop(guard);
                tracing::debug!(request_id = %request_id, ?timeout, "Call timed out");
                Err(RpcError::Timeout {
                    request_id: request_id.clone(),
                    timeout,
                })
            }
        }
    }

    /// Call `path` with a fresh request ID and raw message bytes.
    pub async fn request(&self, path: &str, message: Bytes, options: CallOptions) -> Result<ResponseEnvelope> {
        let CallOptions { timeout, mut headers } = options;
        headers
            .entry(REQUEST_ID_HEADER.to_string())
            .or_insert_with(new_request_id);
        let request = RequestEnvelope::new(path, headers, message);
        self.call(
            request,
            CallOptions {
                timeout,
                headers: Metadata::new(),
            },
        )
        .await
    }

    /// Unary call with explicit serialize/deserialize functions.
    ///
    /// An error status becomes [`RpcError::Status`]; a successful response
    /// must carry exactly one message.
    pub async fn unary_with<Req, Resp, S, D>(
        &self,
        path: &str,
        request: &Req,
        serialize: S,
        deserialize: D,
        options: CallOptions,
    ) -> Result<Resp>
    where
        S: FnOnce(&Req) -> Result<Vec<u8>>,
        D: FnOnce(&[u8]) -> Result<Resp>,
    {
        let message = Bytes::from(serialize(request)?);
        let response = self.request(path, message, options).await?.into_result()?;
        match response.messages.as_slice() {
            [message] => deserialize(&message[..]),
            messages => Err(RpcError::UnexpectedMessageCount(messages.len())),
        }
    }

    /// Unary call using a [`Codec`] for both directions.
    pub async fn unary<C, Req, Resp>(&self, path: &str, request: &Req, options: CallOptions) -> Result<Resp>
    where
        C: Codec,
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.unary_with(
            path,
            request,
            |value: &Req| C::encode(value),
            |bytes: &[u8]| C::decode::<Resp>(bytes),
            options,
        )
        .await
    }

    /// Server-streaming call: decode every message of a successful response.
    pub async fn server_streaming<C, Req, Resp>(
        &self,
        path: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<Vec<Resp>>
    where
        C: Codec,
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let message = Bytes::from(C::encode(request)?);
        let response = self.request(path, message, options).await?.into_result()?;
        response
            .messages
            .iter()
            .map(|message| C::decode(message))
            .collect()
    }

    /// Close the transport.
    ///
    /// Rejects every pending call with [`RpcError::Closed`] and closes the
    /// channel. Later calls fail with [`RpcError::TransportClosed`].
    /// Repeated calls are no-ops.
    pub fn close(&self) {
        if self.shared.shutdown() {
            tracing::debug!("Client closed");
            self.shared.sender.close();
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("pending_calls", &self.pending_calls())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Match inbound responses to pending calls until the channel ends.
async fn read_loop(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
    loop {
        match events.recv().await {
            Some(ChannelEvent::Message(bytes)) => shared.handle_message(bytes),
            Some(ChannelEvent::Closed) | None => {
                if shared.shutdown() {
                    tracing::warn!("Channel closed by peer");
                    shared.sender.close();
                }
                break;
            }
            Some(ChannelEvent::Error(e)) => {
                if shared.shutdown() {
                    tracing::warn!("Channel failed: {}", e);
                    shared.sender.close();
                }
                break;
            }
        }
    }
}
