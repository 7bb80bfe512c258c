//! Symbol lookup for `FileContainingSymbol`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use prost_types::{DescriptorProto, EnumDescriptorProto, FileDescriptorProto};

use crate::error::{RpcError, Result};

/// Resolves fully-qualified symbols to the file that defines them.
pub trait DescriptorRegistry: Send + Sync + 'static {
    /// The file defining `symbol` (e.g. `echo.Echo`, `echo.SayRequest`).
    fn file_containing_symbol(&self, symbol: &str) -> Option<Arc<FileDescriptorProto>>;
}

/// In-memory descriptor registry.
///
/// Indexes every message (including nested), enum, service, and method
/// of each added file under its fully-qualified name. Files are kept as
/// given, so options, oneofs, and extensions survive lookup unchanged.
#[derive(Debug, Default)]
pub struct DescriptorPool {
    files: Vec<Arc<FileDescriptorProto>>,
    symbols: HashMap<String, usize>,
}

impl DescriptorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file and index its symbols.
    ///
    /// Fails without modifying the pool if a symbol is already defined.
    pub fn add_file(&mut self, file: FileDescriptorProto) -> Result<()> {
        let mut names = Vec::new();
        let prefix = file.package();
        collect_messages(prefix, &file.message_type, &mut names);
        collect_enums(prefix, &file.enum_type, &mut names);
        for service in &file.service {
            let service_name = qualify(prefix, service.name());
            for method in &service.method {
                names.push(qualify(&service_name, method.name()));
            }
            names.push(service_name);
        }

        {
            let mut seen = HashSet::new();
            for name in &names {
                if self.symbols.contains_key(name) || !seen.insert(name.as_str()) {
                    return Err(RpcError::Descriptor(format!(
                        "symbol {} defined twice (in {})",
                        name,
                        file.name()
                    )));
                }
            }
        }

        let index = self.files.len();
        tracing::debug!(file = %file.name(), symbols = names.len(), "Indexed descriptor file");
        self.files.push(Arc::new(file));
        self.symbols.extend(names.into_iter().map(|name| (name, index)));
        Ok(())
    }

    /// Every indexed symbol, sorted.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn files(&self) -> &[Arc<FileDescriptorProto>] {
        &self.files
    }
}

impl DescriptorRegistry for DescriptorPool {
    fn file_containing_symbol(&self, symbol: &str) -> Option<Arc<FileDescriptorProto>> {
        let symbol = symbol.strip_prefix('.').unwrap_or(symbol);
        self.symbols
            .get(symbol)
            .and_then(|&index| self.files.get(index))
            .cloned()
    }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn collect_messages(prefix: &str, messages: &[DescriptorProto], out: &mut Vec<String>) {
    for message in messages {
        let name = qualify(prefix, message.name());
        collect_messages(&name, &message.nested_type, out);
        collect_enums(&name, &message.enum_type, out);
        out.push(name);
    }
}

fn collect_enums(prefix: &str, enums: &[EnumDescriptorProto], out: &mut Vec<String>) {
    out.extend(enums.iter().map(|e| qualify(prefix, e.name())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{MethodDescriptorProto, ServiceDescriptorProto};

    fn message(name: &str) -> DescriptorProto {
        DescriptorProto {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn enumeration(name: &str) -> EnumDescriptorProto {
        EnumDescriptorProto {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn file(name: &str, package: &str, message_type: Vec<DescriptorProto>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: (!package.is_empty()).then(|| package.to_string()),
            message_type,
            ..Default::default()
        }
    }

    fn pool() -> DescriptorPool {
        let mut echo = file(
            "echo.proto",
            "echo",
            vec![DescriptorProto {
                nested_type: vec![message("Options")],
                enum_type: vec![enumeration("Tone")],
                ..message("SayRequest")
            }],
        );
        echo.enum_type.push(enumeration("Mood"));
        echo.service.push(ServiceDescriptorProto {
            name: Some("Echo".into()),
            method: vec![MethodDescriptorProto {
                name: Some("Say".into()),
                input_type: Some(".echo.SayRequest".into()),
                output_type: Some(".echo.SayRequest".into()),
                ..Default::default()
            }],
            ..Default::default()
        });

        let mut pool = DescriptorPool::new();
        pool.add_file(echo).unwrap();
        pool.add_file(file("bare.proto", "", vec![message("Bare")])).unwrap();
        pool
    }

    #[test]
    fn test_indexes_every_symbol() {
        let pool = pool();
        assert_eq!(
            pool.symbols(),
            vec![
                "Bare",
                "echo.Echo",
                "echo.Echo.Say",
                "echo.Mood",
                "echo.SayRequest",
                "echo.SayRequest.Options",
                "echo.SayRequest.Tone",
            ]
        );
    }

    #[test]
    fn test_lookup_returns_enclosing_file() {
        let pool = pool();
        let found = pool.file_containing_symbol("echo.SayRequest.Options").unwrap();
        assert_eq!(found.name(), "echo.proto");
        assert_eq!(pool.file_containing_symbol(".echo.Echo").unwrap().name(), "echo.proto");
        assert_eq!(pool.file_containing_symbol("Bare").unwrap().name(), "bare.proto");
        assert!(pool.file_containing_symbol("echo.Missing").is_none());
    }

    #[test]
    fn test_duplicate_symbol_is_rejected() {
        let mut pool = pool();
        let result = pool.add_file(file("other.proto", "echo", vec![message("SayRequest")]));
        assert!(matches!(result, Err(RpcError::Descriptor(_))));
        assert_eq!(pool.files().len(), 2);
    }
}
