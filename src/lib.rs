//! # channel-rpc
//!
//! gRPC-Web compatible RPC over a single ordered binary message channel.
//!
//! The channel only moves whole opaque messages (a WebRTC data channel, a
//! Unix socket with length prefixes, an in-process pair). This crate layers
//! method dispatch, metadata, streaming responses, typed errors, and
//! concurrent call correlation on top of it.
//!
//! ## Architecture
//!
//! - **Protocol**: frames (`flag | u32 len | payload`) and request/response
//!   envelopes built from them
//! - **Client**: [`RpcClient`] correlates responses to calls by `x-request-id`
//! - **Server**: [`Server`] dispatches requests to a [`HandlerRegistry`]
//! - **Reflection**: `ListServices` / `FileContainingSymbol` discovery
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use channel_rpc::codec::JsonCodec;
//! use channel_rpc::handler::{typed_handler, HandlerRegistry};
//! use channel_rpc::transport::memory;
//! use channel_rpc::{CallOptions, ClientConfig, RpcClient, Server};
//!
//! #[tokio::main]
//! async fn main() -> channel_rpc::Result<()> {
//!     let (caller, callee) = memory::pair();
//!
//!     let registry = Arc::new(HandlerRegistry::new());
//!     registry.register(
//!         "/math.Calc/Double",
//!         typed_handler::<JsonCodec, i64, i64, _, _>(|_ctx, n| async move { Ok(n * 2) }),
//!     );
//!     let _serving = Server::new(registry).serve(callee);
//!
//!     let client = RpcClient::new(caller, ClientConfig::default());
//!     let n: i64 = client
//!         .unary::<JsonCodec, _, _>("/math.Calc/Double", &21, CallOptions::default())
//!         .await?;
//!     assert_eq!(n, 42);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod reflection;
pub mod status;
pub mod transport;

mod client;
mod server;

pub use client::{
    new_request_id, CallOptions, ClientConfig, RpcClient, UnmatchedHook, DEFAULT_CALL_TIMEOUT,
    DEFAULT_MAX_PENDING_CALLS,
};
pub use error::{Result, RpcError};
pub use handler::{HandlerRegistry, RequestContext};
pub use protocol::{Metadata, RequestEnvelope, ResponseEnvelope};
pub use server::{ServeHandle, Server, ServerConfig, DEFAULT_MAX_CONCURRENT_HANDLERS};
pub use status::{Code, Status};
