//! Caller side of reflection.

use std::sync::Arc;

use base64::Engine;
use prost::Message;
use prost_types::FileDescriptorProto;

use super::service::{
    FileContainingSymbolRequest, FileContainingSymbolResponse, ListServicesRequest,
    ListServicesResponse, ServiceInfo, FILE_CONTAINING_SYMBOL_PATH, LIST_SERVICES_PATH,
};
use crate::client::{CallOptions, RpcClient};
use crate::codec::JsonCodec;
use crate::error::Result;

/// Discover a peer's services over an existing [`RpcClient`].
#[derive(Debug, Clone)]
pub struct ReflectionClient {
    client: Arc<RpcClient>,
    options: CallOptions,
}

impl ReflectionClient {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self {
            client,
            options: CallOptions::default(),
        }
    }

    /// Options applied to every reflection call.
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// List the peer's services and their methods.
    pub async fn list_services(&self) -> Result<Vec<ServiceInfo>> {
        let response: ListServicesResponse = self
            .client
            .unary::<JsonCodec, _, _>(LIST_SERVICES_PATH, &ListServicesRequest::default(), self.options.clone())
            .await?;
        Ok(response.services)
    }

    /// Fetch and decode the descriptor of the file defining `symbol`.
    ///
    /// Malformed or excessively nested descriptor bytes fail with
    /// [`RpcError::ProtoDecode`](crate::RpcError::ProtoDecode).
    pub async fn file_containing_symbol(&self, symbol: &str) -> Result<FileDescriptorProto> {
        let request = FileContainingSymbolRequest {
            symbol: symbol.to_string(),
        };
        let response: FileContainingSymbolResponse = self
            .client
            .unary::<JsonCodec, _, _>(FILE_CONTAINING_SYMBOL_PATH, &request, self.options.clone())
            .await?;

        let bytes = base64::engine::general_purpose::STANDARD.decode(response.file_descriptor_proto)?;
        Ok(FileDescriptorProto::decode(bytes.as_slice())?)
    }
}
