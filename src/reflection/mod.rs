//! Reflection module - service discovery over the RPC transport.
//!
//! Provides:
//! - [`ReflectionService`] - `ListServices` and `FileContainingSymbol`
//!   handlers registered into a [`HandlerRegistry`](crate::handler::HandlerRegistry)
//! - [`ReflectionClient`] - the calling side of both methods
//! - [`DescriptorPool`] - symbol lookup over `prost_types` file descriptors
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use channel_rpc::handler::HandlerRegistry;
//! use channel_rpc::reflection::ReflectionService;
//!
//! let registry = Arc::new(HandlerRegistry::new());
//! ReflectionService::new(registry.clone()).register(&registry);
//! ```

mod client;
mod pool;
mod service;

pub use client::ReflectionClient;
pub use pool::{DescriptorPool, DescriptorRegistry};
pub use prost_types::FileDescriptorProto;
pub use service::{
    group_services, FileContainingSymbolRequest, FileContainingSymbolResponse, ListServicesRequest,
    ListServicesResponse, ReflectionService, ServiceInfo, FILE_CONTAINING_SYMBOL_PATH,
    LIST_SERVICES_PATH, REFLECTION_PREFIX,
};
