//! Reflection handlers.
//!
//! `ListServices` groups the registry's live method paths by service.
//! `FileContainingSymbol` returns the base64 binary descriptor of the file
//! defining a symbol, when a [`DescriptorRegistry`] is attached.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use prost::Message;
use serde::{Deserialize, Serialize};

use super::pool::DescriptorRegistry;
use crate::error::Result;
use crate::handler::{handler_fn, HandlerRegistry, MethodLister};
use crate::protocol::{RequestEnvelope, ResponseEnvelope, CONTENT_TYPE};
use crate::status::{Status, INTERNAL_ERROR_MESSAGE};

/// Path prefix shared by all reflection methods; never listed.
pub const REFLECTION_PREFIX: &str = "/grpc.reflection.";

pub const LIST_SERVICES_PATH: &str = "/grpc.reflection.v1alpha.ServerReflection/ListServices";

pub const FILE_CONTAINING_SYMBOL_PATH: &str =
    "/grpc.reflection.v1alpha.ServerReflection/FileContainingSymbol";

const JSON_CONTENT_TYPE: &str = "application/json";

/// One service and its method names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListServicesRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListServicesResponse {
    pub services: Vec<ServiceInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContainingSymbolRequest {
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContainingSymbolResponse {
    /// Base64 of the binary `FileDescriptorProto`.
    pub file_descriptor_proto: String,
}

/// Group method paths into sorted services.
///
/// Paths under [`REFLECTION_PREFIX`] and paths that are not exactly
/// `/service/method` are skipped.
pub fn group_services<I, S>(paths: I) -> Vec<ServiceInfo>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in paths {
        let path = path.as_ref();
        if path.starts_with(REFLECTION_PREFIX) {
            continue;
        }
        let Some(rest) = path.strip_prefix('/') else {
            continue;
        };
        let mut segments = rest.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(service), Some(method), None) if !service.is_empty() && !method.is_empty() => {
                grouped
                    .entry(service.to_string())
                    .or_default()
                    .push(method.to_string());
            }
            _ => continue,
        }
    }

    grouped
        .into_iter()
        .map(|(name, mut methods)| {
            methods.sort();
            ServiceInfo { name, methods }
        })
        .collect()
}

/// The reflection service.
///
/// Holds only a [`MethodLister`] view of the handler registry, so it can be
/// registered into the same registry it describes.
#[derive(Clone)]
pub struct ReflectionService {
    methods: Arc<dyn MethodLister>,
    descriptors: Option<Arc<dyn DescriptorRegistry>>,
}

impl ReflectionService {
    pub fn new(methods: Arc<dyn MethodLister>) -> Self {
        Self {
            methods,
            descriptors: None,
        }
    }

    /// Attach a descriptor registry for `FileContainingSymbol`.
    pub fn with_descriptors(mut self, descriptors: Arc<dyn DescriptorRegistry>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    /// Services currently registered, recomputed on every call.
    pub fn list_services(&self) -> Vec<ServiceInfo> {
        group_services(self.methods.registered_methods())
    }

    /// Find the file defining `symbol` and encode it.
    ///
    /// NOT_FOUND if no registry is attached or the symbol is unknown.
    pub fn file_containing_symbol(&self, symbol: &str) -> std::result::Result<FileContainingSymbolResponse, Status> {
        let file = self
            .descriptors
            .as_ref()
            .and_then(|registry| registry.file_containing_symbol(symbol))
            .ok_or_else(|| Status::not_found(format!("symbol not found: {}", symbol)))?;

        let encoded = file.encode_to_vec();
        Ok(FileContainingSymbolResponse {
            file_descriptor_proto: base64::engine::general_purpose::STANDARD.encode(encoded),
        })
    }

    /// Register both reflection methods.
    pub fn register(self, registry: &HandlerRegistry) {
        let service = Arc::new(self);

        let list = service.clone();
        registry.register(
            LIST_SERVICES_PATH,
            handler_fn(move |_ctx, _req| {
                let services = list.list_services();
                async move {
                    let response = ListServicesResponse { services };
                    Ok(json_response(&response))
                }
            }),
        );

        let lookup = service;
        registry.register(
            FILE_CONTAINING_SYMBOL_PATH,
            handler_fn(move |_ctx, request: RequestEnvelope| {
                let result = lookup_symbol(&lookup, &request);
                async move { result }
            }),
        );
    }
}

fn lookup_symbol(service: &ReflectionService, request: &RequestEnvelope) -> Result<ResponseEnvelope> {
    let parsed: FileContainingSymbolRequest = match serde_json::from_slice(&request.message) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!("Invalid FileContainingSymbol request: {}", e);
            let status = Status::invalid_argument("request must be {\"symbol\": string}");
            return Ok(ResponseEnvelope::from_status(&status));
        }
    };

    match service.file_containing_symbol(&parsed.symbol) {
        Ok(response) => Ok(json_response(&response)),
        Err(status) => {
            tracing::debug!(symbol = %parsed.symbol, "Symbol lookup failed: {}", status);
            Ok(ResponseEnvelope::from_status(&status))
        }
    }
}

/// Encode a JSON reply, or INTERNAL if serialization fails.
fn json_response<T: Serialize>(value: &T) -> ResponseEnvelope {
    match serde_json::to_vec(value) {
        Ok(body) => ResponseEnvelope::unary(Bytes::from(body)).with_header(CONTENT_TYPE, JSON_CONTENT_TYPE),
        Err(e) => {
            tracing::error!("Failed to encode reflection response: {}", e);
            ResponseEnvelope::from_status(&Status::internal(INTERNAL_ERROR_MESSAGE))
        }
    }
}

impl std::fmt::Debug for ReflectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectionService")
            .field("descriptors", &self.descriptors.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RequestContext;
    use crate::protocol::{Metadata, GRPC_MESSAGE, GRPC_STATUS};
    use crate::reflection::pool::DescriptorPool;
    use prost_types::{
        DescriptorProto, FieldDescriptorProto, FileDescriptorProto, MessageOptions, OneofDescriptorProto,
        ServiceDescriptorProto,
    };

    fn noop() -> impl crate::handler::Handler {
        handler_fn(|_ctx, _req| async move { Ok(ResponseEnvelope::ok()) })
    }

    async fn invoke(registry: &HandlerRegistry, path: &str, body: &[u8]) -> ResponseEnvelope {
        let handler = registry.get(path).unwrap();
        let ctx = RequestContext::new(path, "r", Metadata::new());
        let request = RequestEnvelope::new(path, Metadata::new(), Bytes::copy_from_slice(body));
        handler.call(ctx, request).await.unwrap()
    }

    #[test]
    fn test_group_services_sorted_and_filtered() {
        let services = group_services([
            "/b.T/M1",
            "/a.S/M2",
            "/a.S/M1",
            "/grpc.reflection.v1alpha.ServerReflection/ListServices",
            "/too/many/segments",
            "no-leading-slash/M",
            "/a.S/",
            "//M",
        ]);

        assert_eq!(
            services,
            vec![
                ServiceInfo {
                    name: "a.S".into(),
                    methods: vec!["M1".into(), "M2".into()],
                },
                ServiceInfo {
                    name: "b.T".into(),
                    methods: vec!["M1".into()],
                },
            ]
        );
    }

    #[test]
    fn test_list_services_is_live() {
        let registry = Arc::new(HandlerRegistry::new());
        let service = ReflectionService::new(registry.clone());
        assert!(service.list_services().is_empty());

        registry.register("/x.Y/Z", noop());
        assert_eq!(service.list_services()[0].name, "x.Y");
    }

    #[tokio::test]
    async fn test_list_services_handler_excludes_itself() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register("/a.S/M1", noop());
        ReflectionService::new(registry.clone()).register(&registry);

        let response = invoke(&registry, LIST_SERVICES_PATH, b"{}").await;
        assert_eq!(response.trailers[GRPC_STATUS], "0");
        assert_eq!(response.headers[CONTENT_TYPE], "application/json");

        let body: ListServicesResponse = serde_json::from_slice(&response.messages[0]).unwrap();
        assert_eq!(body.services.len(), 1);
        assert_eq!(body.services[0].name, "a.S");
    }

    #[tokio::test]
    async fn test_json_escaping() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register("/q\"uote\\s.S/line\nbreak\r\ttab", noop());
        ReflectionService::new(registry.clone()).register(&registry);

        let response = invoke(&registry, LIST_SERVICES_PATH, b"").await;
        let raw = std::str::from_utf8(&response.messages[0]).unwrap();
        assert!(raw.contains(r#"q\"uote\\s.S"#));
        assert!(raw.contains(r#"line\nbreak\r\ttab"#));

        let body: ListServicesResponse = serde_json::from_slice(&response.messages[0]).unwrap();
        assert_eq!(body.services[0].methods[0], "line\nbreak\r\ttab");
    }

    /// A file using map fields and oneofs, which only survive the round trip
    /// if the full descriptor is served.
    fn echo_file() -> FileDescriptorProto {
        let entry = DescriptorProto {
            name: Some("TagsEntry".into()),
            field: vec![
                FieldDescriptorProto {
                    name: Some("key".into()),
                    number: Some(1),
                    ..Default::default()
                },
                FieldDescriptorProto {
                    name: Some("value".into()),
                    number: Some(2),
                    ..Default::default()
                },
            ],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        FileDescriptorProto {
            name: Some("echo.proto".into()),
            package: Some("echo".into()),
            message_type: vec![DescriptorProto {
                name: Some("SayRequest".into()),
                field: vec![FieldDescriptorProto {
                    name: Some("text".into()),
                    number: Some(1),
                    oneof_index: Some(0),
                    default_value: Some("hi".into()),
                    ..Default::default()
                }],
                nested_type: vec![entry],
                oneof_decl: vec![OneofDescriptorProto {
                    name: Some("body".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            service: vec![ServiceDescriptorProto {
                name: Some("Echo".into()),
                ..Default::default()
            }],
            syntax: Some("proto3".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_file_containing_symbol() {
        let mut pool = DescriptorPool::new();
        pool.add_file(echo_file()).unwrap();

        let registry = Arc::new(HandlerRegistry::new());
        ReflectionService::new(registry.clone())
            .with_descriptors(Arc::new(pool))
            .register(&registry);

        let response = invoke(&registry, FILE_CONTAINING_SYMBOL_PATH, br#"{"symbol":"echo.Echo"}"#).await;
        assert_eq!(response.trailers[GRPC_STATUS], "0");
        let body: FileContainingSymbolResponse = serde_json::from_slice(&response.messages[0]).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body.file_descriptor_proto)
            .unwrap();
        let served = FileDescriptorProto::decode(bytes.as_slice()).unwrap();
        assert_eq!(served, echo_file());

        let request = &served.message_type[0];
        assert_eq!(request.oneof_decl[0].name(), "body");
        assert_eq!(request.field[0].oneof_index, Some(0));
        assert_eq!(request.field[0].default_value(), "hi");
        assert_eq!(request.nested_type[0].options.as_ref().unwrap().map_entry, Some(true));

        let missing = invoke(&registry, FILE_CONTAINING_SYMBOL_PATH, br#"{"symbol":"echo.Nope"}"#).await;
        assert_eq!(missing.trailers[GRPC_STATUS], "5");
        assert_eq!(missing.trailers[GRPC_MESSAGE], "symbol not found: echo.Nope");

        let invalid = invoke(&registry, FILE_CONTAINING_SYMBOL_PATH, b"[]").await;
        assert_eq!(invalid.trailers[GRPC_STATUS], "3");
    }

    #[test]
    fn test_without_registry_is_not_found() {
        let service = ReflectionService::new(Arc::new(HandlerRegistry::new()));
        let status = service.file_containing_symbol("a.B").unwrap_err();
        assert_eq!(status.code(), crate::status::Code::NotFound);
    }
}
