//! Callee side: dispatch incoming requests to registered handlers.
//!
//! The [`Server`] reads request envelopes from a channel, looks each path up
//! in the shared [`HandlerRegistry`], and runs the handler on its own task so
//! a slow handler never blocks requests behind it. Every response echoes the
//! request's `x-request-id`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use channel_rpc::handler::HandlerRegistry;
//! use channel_rpc::Server;
//!
//! let registry = Arc::new(HandlerRegistry::new());
//! let server = Server::new(registry.clone());
//! let handle = server.serve(channel);
//! handle.closed().await;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::handler::{Handler, HandlerRegistry, RequestContext};
use crate::protocol::{RequestEnvelope, ResponseEnvelope, GRPC_STATUS, REQUEST_ID_HEADER};
use crate::status::{Code, Status};
use crate::transport::{Channel, ChannelEvent, ChannelSender};

/// Default maximum concurrent handlers per channel.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Handlers allowed to run at once on one channel. Requests beyond the
    /// limit are answered with RESOURCE_EXHAUSTED.
    pub max_concurrent_handlers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
        }
    }
}

impl ServerConfig {
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit;
        self
    }
}

/// Dispatcher bound to a handler registry.
///
/// One `Server` can serve any number of channels; registrations made on the
/// registry are visible to every channel immediately.
#[derive(Clone)]
pub struct Server {
    registry: Arc<HandlerRegistry>,
    config: ServerConfig,
}

impl Server {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::with_config(registry, ServerConfig::default())
    }

    pub fn with_config(registry: Arc<HandlerRegistry>, config: ServerConfig) -> Self {
        Self { registry, config }
    }

    /// The registry this server dispatches to.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Serve a channel on a background task.
    pub fn serve(&self, channel: Channel) -> ServeHandle {
        let sender = channel.sender();
        let server = self.clone();
        let task = tokio::spawn(async move { server.run(channel).await });
        ServeHandle { sender, task }
    }

    /// Serve a channel until it closes or fails.
    pub async fn run(&self, channel: Channel) {
        let (sender, mut events) = channel.into_parts();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_handlers));

        loop {
            match events.recv().await {
                Some(ChannelEvent::Message(message)) => {
                    self.dispatch(message, &sender, &semaphore);
                }
                Some(ChannelEvent::Closed) | None => {
                    tracing::debug!("Server channel closed");
                    break;
                }
                Some(ChannelEvent::Error(e)) => {
                    tracing::warn!("Server channel failed: {}", e);
                    break;
                }
            }
        }
        drain(&mut events);
    }

    /// Dispatch one inbound message.
    fn dispatch(&self, message: Bytes, sender: &Arc<dyn ChannelSender>, semaphore: &Arc<Semaphore>) {
        let request = match RequestEnvelope::decode(message) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Dropping undecodable request: {}", e);
                return;
            }
        };

        let request_id = match request.request_id() {
            Some(id) => id.to_string(),
            None => {
                tracing::warn!(path = %request.path, "Request without x-request-id");
                String::new()
            }
        };

        let Some(handler) = self.registry.get(&request.path) else {
            tracing::debug!(path = %request.path, request_id = %request_id, "Method not found");
            let status = Status::unimplemented(format!("method not found: {}", request.path));
            send_response(sender.as_ref(), ResponseEnvelope::from_status(&status), &request_id);
            return;
        };

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(
                    path = %request.path,
                    request_id = %request_id,
                    "Handler capacity reached, rejecting request"
                );
                let status = Status::resource_exhausted("too many concurrent requests");
                send_response(sender.as_ref(), ResponseEnvelope::from_status(&status), &request_id);
                return;
            }
        };

        let sender = sender.clone();
        tokio::spawn(async move {
            // Permit is held until this task completes
            let _permit = permit;
            let response = invoke(handler, request, &request_id).await;
            send_response(sender.as_ref(), response, &request_id);
        });
    }
}

/// Run a handler and map its outcome to a response.
///
/// The handler runs on its own task so a panic is reported as INTERNAL
/// instead of leaving the caller waiting for a timeout.
async fn invoke(handler: Arc<dyn Handler>, request: RequestEnvelope, request_id: &str) -> ResponseEnvelope {
    let path = request.path.clone();
    let ctx = RequestContext::new(path.clone(), request_id, request.headers.clone());

    match tokio::spawn(handler.call(ctx, request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            let status = Status::from_error(&e);
            if e.status().is_none() {
                tracing::error!(path = %path, request_id = %request_id, "Handler failed: {}", e);
            } else {
                tracing::debug!(path = %path, request_id = %request_id, "Handler returned {}", status);
            }
            ResponseEnvelope::from_status(&status)
        }
        Err(e) => {
            tracing::error!(path = %path, request_id = %request_id, "Handler panicked: {}", e);
            ResponseEnvelope::from_status(&Status::internal(crate::status::INTERNAL_ERROR_MESSAGE))
        }
    }
}

/// Echo the correlation ID, default the status, encode, and send.
fn send_response(sender: &dyn ChannelSender, mut response: ResponseEnvelope, request_id: &str) {
    if !request_id.is_empty() {
        response
            .headers
            .entry(REQUEST_ID_HEADER.to_string())
            .or_insert_with(|| request_id.to_string());
    }
    response
        .trailers
        .entry(GRPC_STATUS.to_string())
        .or_insert_with(|| Code::Ok.as_i32().to_string());

    let encoded = match response.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to encode response: {}", e);
            let status = Status::internal(crate::status::INTERNAL_ERROR_MESSAGE);
            let mut fallback = ResponseEnvelope::from_status(&status);
            fallback
                .headers
                .insert(REQUEST_ID_HEADER.to_string(), request_id.to_string());
            match fallback.encode() {
                Ok(bytes) => bytes,
                Err(_) => return,
            }
        }
    };

    if let Err(e) = sender.send(Bytes::from(encoded)) {
        tracing::debug!(request_id = %request_id, "Response not sent: {}", e);
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<ChannelEvent>) {
    let mut dropped = 0usize;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ChannelEvent::Message(_)) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped, "Discarded requests received after close");
    }
}

/// Handle to a channel being served in the background.
pub struct ServeHandle {
    sender: Arc<dyn ChannelSender>,
    task: JoinHandle<()>,
}

impl ServeHandle {
    /// Close the channel; the serve loop exits once the close is observed.
    pub fn close(&self) {
        self.sender.close();
    }

    /// Wait until the serve loop exits (channel closed or failed).
    pub async fn closed(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| crate::error::RpcError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }
}
