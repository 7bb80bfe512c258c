//! Typed handler adapter.
//!
//! Composes a `(deserialize, serialize, business logic)` triple into an
//! opaque [`Handler`]:
//!
//! 1. `deserialize(request.message)`; failure answers INVALID_ARGUMENT
//! 2. `logic(ctx, request)`
//! 3. `serialize(result)` into `messages`, with `grpc-status: 0`
//!
//! Typed errors from the logic are sent with their own code and message;
//! anything else is sent as INTERNAL. The adapter holds no state of its own.
//!
//! # Example
//!
//! ```ignore
//! use channel_rpc::codec::JsonCodec;
//! use channel_rpc::handler::typed_handler;
//!
//! registry.register(
//!     "/math.Calc/Double",
//!     typed_handler::<JsonCodec, _, _, _, _>(|_ctx, n: i64| async move { Ok(n * 2) }),
//! );
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::registry::{BoxFuture, Handler, HandlerResult};
use super::RequestContext;
use crate::codec::Codec;
use crate::error::{RpcError, Result};
use crate::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::status::Status;

/// Marker: the logic returns one value.
pub struct Unary;

/// Marker: the logic returns a `Vec` of values, one DATA frame each.
pub struct Streaming;

/// Handler that decodes the request, runs business logic, and encodes the result.
pub struct TypedHandler<D, S, F, Req, Resp, Mode> {
    deserialize: D,
    serialize: Arc<S>,
    logic: F,
    _phantom: PhantomData<fn(Req, Mode) -> Resp>,
}

impl<D, S, F, Req, Resp, Mode> TypedHandler<D, S, F, Req, Resp, Mode>
where
    D: Fn(&[u8]) -> Result<Req>,
{
    fn new(deserialize: D, serialize: S, logic: F) -> Self {
        Self {
            deserialize,
            serialize: Arc::new(serialize),
            logic,
            _phantom: PhantomData,
        }
    }

    /// Decode the request body, or build the INVALID_ARGUMENT response.
    fn decode(&self, request: &RequestEnvelope) -> std::result::Result<Req, ResponseEnvelope> {
        (self.deserialize)(&request.message).map_err(|e| {
            tracing::debug!(path = %request.path, "Request decode failed: {}", e);
            let status = Status::invalid_argument(format!("invalid request for {}", request.path));
            ResponseEnvelope::from_status(&status)
        })
    }
}

/// Build a unary handler from a serialize/deserialize pair and business logic.
pub fn make_handler<Req, Resp, D, S, F, Fut>(
    deserialize: D,
    serialize: S,
    logic: F,
) -> TypedHandler<D, S, F, Req, Resp, Unary>
where
    D: Fn(&[u8]) -> Result<Req> + Send + Sync + 'static,
    S: Fn(&Resp) -> Result<Vec<u8>> + Send + Sync + 'static,
    F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    TypedHandler::new(deserialize, serialize, logic)
}

/// Build a streaming handler: every item the logic returns becomes one DATA frame.
pub fn make_stream_handler<Req, Resp, D, S, F, Fut>(
    deserialize: D,
    serialize: S,
    logic: F,
) -> TypedHandler<D, S, F, Req, Resp, Streaming>
where
    D: Fn(&[u8]) -> Result<Req> + Send + Sync + 'static,
    S: Fn(&Resp) -> Result<Vec<u8>> + Send + Sync + 'static,
    F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Resp>>> + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    TypedHandler::new(deserialize, serialize, logic)
}

/// Unary handler using a [`Codec`] for both directions.
pub fn typed_handler<C, Req, Resp, F, Fut>(
    logic: F,
) -> impl Handler
where
    C: Codec,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    make_handler(|bytes: &[u8]| C::decode::<Req>(bytes), |value: &Resp| C::encode(value), logic)
}

/// Streaming handler using a [`Codec`] for both directions.
pub fn typed_stream_handler<C, Req, Resp, F, Fut>(
    logic: F,
) -> impl Handler
where
    C: Codec,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Resp>>> + Send + 'static,
{
    make_stream_handler(|bytes: &[u8]| C::decode::<Req>(bytes), |value: &Resp| C::encode(value), logic)
}

/// Turn the logic's outcome into a response envelope.
fn finish<Resp, S>(outcome: Result<Vec<Resp>>, serialize: &S, path: &str) -> ResponseEnvelope
where
    S: Fn(&Resp) -> Result<Vec<u8>>,
{
    let encoded: Result<Vec<Bytes>> = outcome.and_then(|items| {
        items
            .iter()
            .map(|item| serialize(item).map(Bytes::from))
            .collect()
    });

    match encoded {
        Ok(messages) => {
            let mut response = ResponseEnvelope::ok();
            response.messages = messages;
            response
        }
        Err(e) => {
            if !matches!(e, RpcError::Status(_)) {
                tracing::error!(path = %path, "Handler failed: {}", e);
            }
            ResponseEnvelope::from_status(&Status::from_error(&e))
        }
    }
}

impl<D, S, F, Fut, Req, Resp> Handler for TypedHandler<D, S, F, Req, Resp, Unary>
where
    D: Fn(&[u8]) -> Result<Req> + Send + Sync + 'static,
    S: Fn(&Resp) -> Result<Vec<u8>> + Send + Sync + 'static,
    F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn call(&self, ctx: RequestContext, request: RequestEnvelope) -> BoxFuture<'static, HandlerResult> {
        let parsed = match self.decode(&request) {
            Ok(v) => v,
            Err(response) => return Box::pin(async move { Ok(response) }),
        };

        let serialize = self.serialize.clone();
        let fut = (self.logic)(ctx, parsed);
        let path = request.path;
        Box::pin(async move { Ok(finish(fut.await.map(|value| vec![value]), &*serialize, &path)) })
    }
}

impl<D, S, F, Fut, Req, Resp> Handler for TypedHandler<D, S, F, Req, Resp, Streaming>
where
    D: Fn(&[u8]) -> Result<Req> + Send + Sync + 'static,
    S: Fn(&Resp) -> Result<Vec<u8>> + Send + Sync + 'static,
    F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Resp>>> + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn call(&self, ctx: RequestContext, request: RequestEnvelope) -> BoxFuture<'static, HandlerResult> {
        let parsed = match self.decode(&request) {
            Ok(v) => v,
            Err(response) => return Box::pin(async move { Ok(response) }),
        };

        let serialize = self.serialize.clone();
        let fut = (self.logic)(ctx, parsed);
        let path = request.path;
        Box::pin(async move { Ok(finish(fut.await, &*serialize, &path)) })
    }
}
