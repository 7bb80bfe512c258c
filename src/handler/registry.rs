//! Handler registry for dispatching requests by method path.
//!
//! The registry maps `/package.Service/Method` paths to handlers. Lookup is
//! a single exact string match. Registering a path twice replaces the
//! earlier handler.
//!
//! # Example
//!
//! ```ignore
//! use channel_rpc::handler::{handler_fn, HandlerRegistry};
//! use channel_rpc::ResponseEnvelope;
//!
//! let registry = HandlerRegistry::new();
//! registry.register("/echo.Echo/Say", handler_fn(|_ctx, req| async move {
//!     Ok(ResponseEnvelope::unary(req.message))
//! }));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

use super::RequestContext;
use crate::error::Result;
use crate::protocol::{RequestEnvelope, ResponseEnvelope};

/// Result type for handler functions.
pub type HandlerResult = Result<ResponseEnvelope>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for request handlers.
///
/// A handler returns the full response envelope. Returning
/// `Err(RpcError::Status(..))` sends that status; any other error is sent
/// as INTERNAL.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: RequestContext, request: RequestEnvelope) -> BoxFuture<'static, HandlerResult>;
}

/// Handler backed by an async closure.
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(RequestContext, RequestEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: RequestContext, request: RequestEnvelope) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.f)(ctx, request))
    }
}

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(RequestContext, RequestEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { f }
}

/// Read-only view of the registered method paths.
///
/// Reflection depends on this instead of the full registry.
pub trait MethodLister: Send + Sync + 'static {
    /// Paths registered right now.
    fn registered_methods(&self) -> Vec<String>;
}

/// Registry mapping method paths to handlers.
///
/// Interior locking makes it safe to register or unregister while a
/// dispatcher is serving; share it as `Arc<HandlerRegistry>`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler already at `path`.
    pub fn register<H: Handler>(&self, path: impl Into<String>, handler: H) {
        self.register_arc(path, Arc::new(handler));
    }

    /// Register an already shared handler.
    pub fn register_arc(&self, path: impl Into<String>, handler: Arc<dyn Handler>) {
        let path = path.into();
        if self.handlers.write().insert(path.clone(), handler).is_some() {
            tracing::debug!(path = %path, "Replaced handler");
        }
    }

    /// Remove the handler at `path`. Returns whether one was registered.
    pub fn unregister(&self, path: &str) -> bool {
        self.handlers.write().remove(path).is_some()
    }

    /// Look up the handler for `path` (exact match).
    pub fn get(&self, path: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.read().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.handlers.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl MethodLister for HandlerRegistry {
    fn registered_methods(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.handlers.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}
