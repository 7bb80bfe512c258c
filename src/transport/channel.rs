//! Message channel abstraction.
//!
//! A channel moves whole opaque messages in order between two peers. The
//! sending half is a [`ChannelSender`]; inbound traffic arrives as
//! [`ChannelEvent`]s on an unbounded queue that a single reader task
//! consumes.
//!
//! ```text
//!   send(bytes) ──► ChannelSender ──► peer
//!   peer ──► mpsc::UnboundedReceiver<ChannelEvent> ──► reader task
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Something that happened on the inbound side of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One complete message.
    Message(Bytes),
    /// The channel closed (by either side).
    Closed,
    /// The channel failed; no further messages will arrive.
    Error(String),
}

/// Sending half of a message channel.
pub trait ChannelSender: Send + Sync + 'static {
    /// Send one message. Fails once the channel is closed.
    fn send(&self, message: Bytes) -> Result<()>;

    /// Close the channel.
    ///
    /// Delivers [`ChannelEvent::Closed`] to the local event queue and to the
    /// peer. Repeated calls are no-ops.
    fn close(&self);
}

/// Both halves of an open channel.
pub struct Channel {
    sender: Arc<dyn ChannelSender>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Channel {
    pub fn new(
        sender: Arc<dyn ChannelSender>,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        Self { sender, events }
    }

    /// Get a handle to the sending half.
    pub fn sender(&self) -> Arc<dyn ChannelSender> {
        self.sender.clone()
    }

    /// Receive the next inbound event. `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Split into the sending half and the event queue.
    pub fn into_parts(
        self,
    ) -> (
        Arc<dyn ChannelSender>,
        mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        (self.sender, self.events)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}
