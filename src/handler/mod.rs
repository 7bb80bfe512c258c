//! Handler module - request handling on the callee side.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps method paths to handlers
//! - [`RequestContext`] - per-call information passed to handlers
//! - [`make_handler`] / [`typed_handler`] - typed adapters that hide the
//!   byte-level envelope from business logic
//!
//! # Example
//!
//! ```ignore
//! use channel_rpc::codec::MsgPackCodec;
//! use channel_rpc::handler::{typed_handler, typed_stream_handler, HandlerRegistry};
//!
//! let registry = HandlerRegistry::new();
//!
//! registry.register(
//!     "/echo.Echo/Say",
//!     typed_handler::<MsgPackCodec, String, String, _, _>(|_ctx, text| async move { Ok(text) }),
//! );
//!
//! registry.register(
//!     "/count.Counter/Up",
//!     typed_stream_handler::<MsgPackCodec, u32, u32, _, _>(|_ctx, n| async move {
//!         Ok((0..n).collect())
//!     }),
//! );
//! ```

mod context;
mod registry;
mod typed;

pub use context::RequestContext;
pub use registry::{
    handler_fn, BoxFuture, FnHandler, Handler, HandlerRegistry, HandlerResult, MethodLister,
};
pub use typed::{
    make_handler, make_stream_handler, typed_handler, typed_stream_handler, Streaming,
    TypedHandler, Unary,
};
