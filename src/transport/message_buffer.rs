//! Message buffer for reassembling length-delimited messages from a byte stream.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented reads:
//! - `WaitingForLength`: Need at least 4 bytes
//! - `WaitingForBody`: Length parsed, need N more bytes
//!
//! # Example
//!
//! ```ignore
//! let mut buffer = MessageBuffer::new(DEFAULT_MAX_MESSAGE_SIZE);
//!
//! // Data arrives in chunks from the socket
//! for message in buffer.push(&chunk)? {
//!     events.send(ChannelEvent::Message(message))?;
//! }
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{RpcError, Result};
use crate::protocol::LENGTH_PREFIX_SIZE;

/// Default maximum message size (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

/// State machine for message parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 4-byte length prefix.
    WaitingForLength,
    /// Prefix parsed, waiting for body bytes.
    WaitingForBody { length: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct MessageBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed message size.
    max_message_size: u32,
}

impl MessageBuffer {
    pub fn new(max_message_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForLength,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns error if a length prefix exceeds `max_message_size`.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one()? {
            messages.push(message);
        }
        Ok(messages)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }
                    let prefix = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                    let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);

                    if length > self.max_message_size {
                        return Err(RpcError::Protocol(format!(
                            "Message size {} exceeds maximum {}",
                            length, self.max_message_size
                        )));
                    }

                    self.state = State::WaitingForBody {
                        length: length as usize,
                    };
                }

                State::WaitingForBody { length } => {
                    if self.buffer.len() < length {
                        return Ok(None);
                    }
                    let message = self.buffer.split_to(length).freeze();
                    self.state = State::WaitingForLength;
                    return Ok(Some(message));
                }
            }
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delimited(payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_single_complete_message() {
        let mut buffer = MessageBuffer::default();
        let messages = buffer.push(&delimited(b"hello")).unwrap();

        assert_eq!(messages, vec![Bytes::from_static(b"hello")]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_messages_in_one_push() {
        let mut buffer = MessageBuffer::default();
        let mut combined = delimited(b"first");
        combined.extend(delimited(b""));
        combined.extend(delimited(b"third"));

        let messages = buffer.push(&combined).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(&messages[0][..], b"first");
        assert!(messages[1].is_empty());
        assert_eq!(&messages[2][..], b"third");
    }

    #[test]
    fn test_fragmented_prefix_and_body() {
        let mut buffer = MessageBuffer::default();
        let bytes = delimited(b"fragmented body");

        assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForLength");

        assert!(buffer.push(&bytes[2..8]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");

        let messages = buffer.push(&bytes[8..]).unwrap();
        assert_eq!(&messages[0][..], b"fragmented body");
        assert_eq!(buffer.state_name(), "WaitingForLength");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = MessageBuffer::default();
        let mut all = Vec::new();
        for byte in delimited(b"hi") {
            all.extend(buffer.push(&[byte]).unwrap());
        }
        assert_eq!(all, vec![Bytes::from_static(b"hi")]);
    }

    #[test]
    fn test_max_message_size() {
        let mut buffer = MessageBuffer::new(100);
        let result = buffer.push(&1000u32.to_be_bytes());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }
}
