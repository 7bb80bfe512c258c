//! Dedicated writer task for stream-backed channels.
//!
//! Senders push length-prefixed messages into an mpsc queue; one task owns
//! the write half and drains the queue, batching whatever is ready into a
//! single vectored write.
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::UnboundedSender<OutboundMessage> ─► Writer Task ─► Stream
//! Handler N ─┘
//! ```

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{RpcError, Result};
use crate::protocol::{wire_length, LENGTH_PREFIX_SIZE};

/// Maximum messages to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A message ready to be written to the stream.
#[derive(Debug)]
pub struct OutboundMessage {
    /// Big-endian length prefix.
    pub prefix: [u8; LENGTH_PREFIX_SIZE],
    pub payload: Bytes,
}

impl OutboundMessage {
    pub fn new(payload: Bytes) -> Result<Self> {
        Ok(Self {
            prefix: wire_length(payload.len())?.to_be_bytes(),
            payload,
        })
    }

    /// Total size on the wire (prefix + payload).
    #[inline]
    pub fn size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.payload.len()
    }
}

/// Receive messages and write them to the stream until the queue closes.
///
/// Shuts the write half down on a clean exit so the peer sees EOF.
pub async fn writer_loop<W>(mut rx: mpsc::UnboundedReceiver<OutboundMessage>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &batch).await?;
        batch.clear();
    }

    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of messages using scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundMessage]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundMessage::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data not yet written.
fn build_remaining_slices(batch: &[OutboundMessage], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for message in batch {
        for part in [&message.prefix[..], &message.payload[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn message(payload: &'static [u8]) -> OutboundMessage {
        OutboundMessage::new(Bytes::from_static(payload)).unwrap()
    }

    #[test]
    fn test_outbound_message() {
        let msg = message(b"hello");
        assert_eq!(msg.prefix, [0, 0, 0, 5]);
        assert_eq!(msg.size(), LENGTH_PREFIX_SIZE + 5);
    }

    #[test]
    fn test_build_remaining_slices() {
        let batch = vec![message(b"hello")];

        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);

        let slices = build_remaining_slices(&batch, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), 2);
        assert_eq!(slices[1].len(), 5);

        let slices = build_remaining_slices(&batch, LENGTH_PREFIX_SIZE + 1);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), 4);
    }

    #[test]
    fn test_build_remaining_slices_skips_empty_payload() {
        let batch = vec![message(b""), message(b"x")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 3);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch = vec![message(b"abc"), message(b"de")];

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(
            buf.into_inner(),
            vec![0, 0, 0, 3, b'a', b'b', b'c', 0, 0, 0, 2, b'd', b'e']
        );
    }

    #[tokio::test]
    async fn test_writer_loop_exits_when_queue_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (client, mut server) = tokio::io::duplex(1024);
        let task = tokio::spawn(writer_loop(rx, client));

        tx.send(message(b"ping")).unwrap();
        drop(tx);
        task.await.unwrap().unwrap();

        let mut received = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut server, &mut received)
            .await
            .unwrap();
        assert_eq!(received, vec![0, 0, 0, 4, b'p', b'i', b'n', b'g']);
    }
}
