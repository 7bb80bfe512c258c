//! Transport module - message channels.
//!
//! Provides:
//! - [`Channel`] / [`ChannelSender`] / [`ChannelEvent`] - the channel contract
//!   the RPC layers run on
//! - [`memory::pair`] - connected in-process channels
//! - [`stream_channel`] - message framing over any async byte stream, plus a
//!   Unix socket listener and `connect` helper

mod channel;
pub mod memory;
mod message_buffer;
mod pipe;
mod writer;

pub use channel::{Channel, ChannelEvent, ChannelSender};
pub use message_buffer::DEFAULT_MAX_MESSAGE_SIZE;
pub use pipe::{generate_pipe_path, stream_channel, PipeConfig, DEFAULT_READ_BUFFER_SIZE};

#[cfg(unix)]
pub use pipe::{connect, PipeListener};
