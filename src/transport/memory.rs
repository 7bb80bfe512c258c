//! In-process channel pair.
//!
//! Useful for tests and for wiring a client to a server inside one process.
//! Delivery is ordered and lossless, like a reliable data channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Channel, ChannelEvent, ChannelSender};
use crate::error::{RpcError, Result};

struct MemorySender {
    /// Peer's event queue.
    peer: mpsc::UnboundedSender<ChannelEvent>,
    /// Our own event queue (receives `Closed` on local close).
    local: mpsc::UnboundedSender<ChannelEvent>,
    closed: Arc<AtomicBool>,
}

impl ChannelSender for MemorySender {
    fn send(&self, message: Bytes) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Closed);
        }
        self.peer
            .send(ChannelEvent::Message(message))
            .map_err(|_| RpcError::Closed)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.local.send(ChannelEvent::Closed);
        let _ = self.peer.send(ChannelEvent::Closed);
    }
}

/// Create two connected channels.
///
/// Messages sent on one side arrive, in order, on the other. Closing either
/// side closes both.
pub fn pair() -> (Channel, Channel) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let a = MemorySender {
        peer: b_tx.clone(),
        local: a_tx.clone(),
        closed: closed.clone(),
    };
    let b = MemorySender {
        peer: a_tx,
        local: b_tx,
        closed,
    };

    (
        Channel::new(Arc::new(a), a_rx),
        Channel::new(Arc::new(b), b_rx),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (a, mut b) = pair();
        let sender = a.sender();

        for i in 0..5u8 {
            sender.send(Bytes::from(vec![i])).unwrap();
        }

        for i in 0..5u8 {
            assert_eq!(b.recv().await, Some(ChannelEvent::Message(Bytes::from(vec![i]))));
        }
    }

    #[tokio::test]
    async fn test_close_notifies_both_sides() {
        let (mut a, mut b) = pair();
        a.sender().close();

        assert_eq!(a.recv().await, Some(ChannelEvent::Closed));
        assert_eq!(b.recv().await, Some(ChannelEvent::Closed));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (a, b) = pair();
        b.sender().close();

        let err = a.sender().send(Bytes::from_static(b"late")).unwrap_err();
        assert!(matches!(err, RpcError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (a, _b) = pair();
        let (sender, mut events) = a.into_parts();
        sender.close();
        sender.close();

        assert_eq!(events.recv().await, Some(ChannelEvent::Closed));
        assert!(events.try_recv().is_err());
    }
}
