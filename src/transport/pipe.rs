//! Stream-backed message channels.
//!
//! Turns any ordered byte stream (Unix socket, in-memory duplex pipe) into a
//! message channel by prefixing each message with a 4-byte big-endian
//! length. A reader task reassembles messages across partial reads; a writer
//! task batches queued messages.
//!
//! # Example
//!
//! ```ignore
//! use channel_rpc::transport::{generate_pipe_path, PipeConfig, PipeListener};
//!
//! let path = generate_pipe_path();
//! let listener = PipeListener::bind(&path).await?;
//! let channel = listener.accept(PipeConfig::default()).await?;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::message_buffer::{MessageBuffer, DEFAULT_MAX_MESSAGE_SIZE};
use super::writer::{writer_loop, OutboundMessage};
use super::{Channel, ChannelEvent, ChannelSender};
use crate::error::{RpcError, Result};

/// Default read buffer size (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for stream-backed channels.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Largest message accepted from the peer.
    pub max_message_size: u32,
    /// Size of each socket read.
    pub read_buffer_size: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

struct StreamSender {
    /// Writer queue; `None` once closed.
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundMessage>>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    reader: AbortHandle,
}

impl ChannelSender for StreamSender {
    fn send(&self, message: Bytes) -> Result<()> {
        let message = OutboundMessage::new(message)?;
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(message).map_err(|_| RpcError::Closed),
            None => Err(RpcError::Closed),
        }
    }

    fn close(&self) {
        // Dropping the queue lets the writer flush and shut the stream down.
        if self.outbound.lock().take().is_none() {
            return;
        }
        self.reader.abort();
        let _ = self.events.send(ChannelEvent::Closed);
    }
}

/// Wrap a byte stream in a message channel.
///
/// Must be called from within a tokio runtime.
pub fn stream_channel<S>(stream: S, config: PipeConfig) -> Channel
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let writer_events = events_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = writer_loop(outbound_rx, write_half).await {
            tracing::warn!("Channel writer failed: {}", e);
            let _ = writer_events.send(ChannelEvent::Error(e.to_string()));
        }
    });

    let reader = tokio::spawn(read_loop(read_half, events_tx.clone(), config));

    let sender = StreamSender {
        outbound: Mutex::new(Some(outbound_tx)),
        events: events_tx,
        reader: reader.abort_handle(),
    };
    Channel::new(Arc::new(sender), events_rx)
}

/// Read the stream, reassemble messages, and forward them as events.
async fn read_loop<R>(mut reader: R, events: mpsc::UnboundedSender<ChannelEvent>, config: PipeConfig)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = MessageBuffer::new(config.max_message_size);
    let mut buf = vec![0u8; config.read_buffer_size];

    let last = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break ChannelEvent::Closed,
            Ok(n) => n,
            Err(e) => break ChannelEvent::Error(e.to_string()),
        };

        match buffer.push(&buf[..n]) {
            Ok(messages) => {
                for message in messages {
                    if events.send(ChannelEvent::Message(message)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => break ChannelEvent::Error(e.to_string()),
        }
    };

    if !buffer.is_empty() {
        tracing::debug!(buffered = buffer.len(), "Stream ended mid-message");
    }
    let _ = events.send(last);
}

/// Generate a unique socket path for this process.
///
/// Format: `{tmp}/channel-rpc-{pid}-{uuid}.sock`
pub fn generate_pipe_path() -> String {
    std::env::temp_dir()
        .join(format!(
            "channel-rpc-{}-{}.sock",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ))
        .to_string_lossy()
        .into_owned()
}

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::path::Path;
    use tokio::net::{UnixListener, UnixStream};

    /// Unix Domain Socket listener producing message channels.
    pub struct PipeListener {
        listener: UnixListener,
        path: String,
    }

    impl PipeListener {
        /// Bind to a Unix socket path.
        ///
        /// Removes any existing socket file at the path before binding.
        pub async fn bind(path: &str) -> Result<Self> {
            if Path::new(path).exists() {
                std::fs::remove_file(path)?;
            }

            let listener = UnixListener::bind(path)?;
            Ok(Self {
                listener,
                path: path.to_string(),
            })
        }

        /// Accept one connection as a message channel.
        pub async fn accept(&self, config: PipeConfig) -> Result<Channel> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(stream_channel(stream, config))
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    /// Connect to a listening socket as a message channel.
    pub async fn connect(path: &str, config: PipeConfig) -> Result<Channel> {
        let stream = UnixStream::connect(path).await?;
        Ok(stream_channel(stream, config))
    }
}

#[cfg(unix)]
pub use unix_impl::{connect, PipeListener};
