//! Echo service - request/response, streaming, and reflection.
//!
//! This example demonstrates:
//! - Registering typed unary and streaming handlers
//! - Serving a channel and calling it through an `RpcClient`
//! - Discovering the served methods with reflection
//!
//! Run with `RUST_LOG=channel_rpc=debug cargo run --example echo` to see
//! the per-call lifecycle logs.

use std::sync::Arc;

use channel_rpc::codec::MsgPackCodec;
use channel_rpc::handler::{typed_handler, typed_stream_handler, HandlerRegistry};
use channel_rpc::reflection::{ReflectionClient, ReflectionService};
use channel_rpc::transport::memory;
use channel_rpc::{CallOptions, ClientConfig, RpcClient, Server};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Input structure for the echo method.
#[derive(Serialize, Deserialize, Debug)]
struct EchoInput {
    message: String,
}

/// Output structure for the echo method.
#[derive(Serialize, Deserialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("echo=info".parse()?))
        .init();

    let registry = Arc::new(HandlerRegistry::new());
    registry.register(
        "/echo.Echo/Say",
        typed_handler::<MsgPackCodec, EchoInput, EchoOutput, _, _>(|_ctx, input| async move {
            Ok(EchoOutput {
                echo: input.message,
            })
        }),
    );
    registry.register(
        "/echo.Echo/Repeat",
        typed_stream_handler::<MsgPackCodec, EchoInput, EchoOutput, _, _>(|_ctx, input| async move {
            Ok(input
                .message
                .split_whitespace()
                .map(|word| EchoOutput {
                    echo: word.to_string(),
                })
                .collect())
        }),
    );
    ReflectionService::new(registry.clone()).register(&registry);

    let (caller, callee) = memory::pair();
    let serving = Server::new(registry).serve(callee);
    let client = Arc::new(RpcClient::new(caller, ClientConfig::default()));

    let reply: EchoOutput = client
        .unary::<MsgPackCodec, _, _>(
            "/echo.Echo/Say",
            &EchoInput {
                message: "hello".into(),
            },
            CallOptions::default(),
        )
        .await?;
    info!(echo = %reply.echo, "Unary reply");

    let words: Vec<EchoOutput> = client
        .server_streaming::<MsgPackCodec, _, _>(
            "/echo.Echo/Repeat",
            &EchoInput {
                message: "one two three".into(),
            },
            CallOptions::default(),
        )
        .await?;
    for word in &words {
        info!(echo = %word.echo, "Stream message");
    }

    let reflection = ReflectionClient::new(client.clone());
    for service in reflection.list_services().await? {
        info!(service = %service.name, methods = ?service.methods, "Discovered service");
    }

    client.close();
    serving.closed().await?;
    Ok(())
}
