//! Connection pump pair.
//!
//! Every live connection, structured or raw, client or host, is driven by
//! the same two tasks:
//!
//! - a **receive pump** that pulls items off the socket with an
//!   [`ItemReader`] and hands them to an [`ItemSink`]
//! - a **write pump** that pulls items from an [`ItemSource`] and writes
//!   them with an [`ItemWriter`]
//!
//! The two pumps share one [`CancellationToken`]. A pump that hits peer
//! EOF, a decode error, a write error or a closed sink cancels it, and the other pump observes the cancellation at its next
//! await point. Callers that own the connection cancel the same token to
//! tear it down from outside.
//!
//! The read and write halves are owned by their pumps and are dropped when
//! the pumps return, which closes the socket.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::protocol::{PacketReader, PacketWriter};
use crate::{Packet, Result};

/// Decodes items from the read half of a connection.
#[async_trait::async_trait]
pub(crate) trait ItemReader: Send + 'static {
    type Item: Send + 'static;

    /// Next item, `Ok(None)` on clean end of stream.
    async fn next_item(&mut self) -> Result<Option<Self::Item>>;
}

/// Encodes items onto the write half of a connection.
#[async_trait::async_trait]
pub(crate) trait ItemWriter: Send + 'static {
    type Item: Send + 'static;

    /// Write one item. An error ends the write pump.
    async fn write_item(&mut self, item: Self::Item) -> Result<()>;
}

/// Destination for items produced by a receive pump.
#[async_trait::async_trait]
pub(crate) trait ItemSink: Send + 'static {
    type Item: Send + 'static;

    /// Deliver one item. Returning `false` ends the receive pump.
    async fn deliver(&mut self, item: Self::Item) -> bool;
}

/// Supplier of items for a write pump.
#[async_trait::async_trait]
pub(crate) trait ItemSource: Send + 'static {
    type Item: Send + 'static;

    /// Next item to write, `None` once the source is exhausted.
    async fn next(&mut self) -> Option<Self::Item>;
}

// --------------------
// Standard strategies
// --------------------

#[async_trait::async_trait]
impl<R> ItemReader for PacketReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    type Item = Packet;

    async fn next_item(&mut self) -> Result<Option<Packet>> {
        self.next_packet().await
    }
}

#[async_trait::async_trait]
impl<W> ItemWriter for PacketWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Item = Packet;

    async fn write_item(&mut self, item: Packet) -> Result<()> {
        self.write_packet(&item).await
    }
}

#[async_trait::async_trait]
impl<T: Send + 'static> ItemSink for mpsc::Sender<T> {
    type Item = T;

    async fn deliver(&mut self, item: T) -> bool {
        self.send(item).await.is_ok()
    }
}

#[async_trait::async_trait]
impl<T: Send + 'static> ItemSource for mpsc::Receiver<T> {
    type Item = T;

    async fn next(&mut self) -> Option<T> {
        self.recv().await
    }
}

/// Receiver shared by every connection of one endpoint.
///
/// Each write pump locks the receiver only while waiting for a single item,
/// so an item is taken by exactly one connection. Items queued while no
/// connection is live stay in the queue.
pub(crate) struct SharedSource<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> SharedSource<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

impl<T> Clone for SharedSource<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

#[async_trait::async_trait]
impl<T: Send + 'static> ItemSource for SharedSource<T> {
    type Item = T;

    async fn next(&mut self) -> Option<T> {
        self.rx.lock().await.recv().await
    }
}

// --------------------
// Pump pair
// --------------------

/// Handles for the two tasks driving one connection.
pub(crate) struct PumpPair {
    // ---
    read: JoinHandle<()>,
    write: JoinHandle<()>,
}

impl PumpPair {
    // ---
    /// Wait for both pumps to stop.
    pub(crate) async fn join(self) {
        // ---
        let _ = self.read.await;
        let _ = self.write.await;
    }
}

/// Spawn the receive and write pumps for one connection.
///
/// The receive pump cancels `exit` when it returns, and so does the write
/// pump on a write error. A closed source only ends writing: the write pump
/// keeps its half open until `exit` fires, so the peer can still send.
pub(crate) fn spawn_pump_pair<R, W, K, S>(
    label: String,
    mut reader: R,
    mut writer: W,
    mut sink: K,
    mut source: S,
    exit: CancellationToken,
) -> PumpPair
where
    R: ItemReader,
    K: ItemSink<Item = R::Item>,
    W: ItemWriter,
    S: ItemSource<Item = W::Item>,
{
    // ---
    let read_exit = exit.clone();
    let read_label = label.clone();
    let read = tokio::spawn(async move {
        // ---
        loop {
            tokio::select! {
                _ = read_exit.cancelled() => break,
                next = reader.next_item() => match next {
                    Ok(Some(item)) => {
                        if !sink.deliver(item).await {
                            crate::log_debug!(read_label, "receive pump: sink closed");
                            break;
                        }
                    }
                    Ok(None) => {
                        crate::log_info!(read_label, "peer closed the connection");
                        break;
                    }
                    Err(err) => {
                        crate::log_warn!(read_label, "receive pump stopped: {err}");
                        break;
                    }
                },
            }
        }
        read_exit.cancel();
    });

    let write_exit = exit.clone();
    let write = tokio::spawn(async move {
        // ---
        loop {
            tokio::select! {
                _ = write_exit.cancelled() => break,
                next = source.next() => match next {
                    Some(item) => {
                        if let Err(err) = writer.write_item(item).await {
                            crate::log_warn!(label, "write pump stopped: {err}");
                            break;
                        }
                    }
                    None => {
                        crate::log_debug!(label, "write pump: source closed, receive only");
                        // Dropping the writer would shut down our side of the socket.
                        write_exit.cancelled().await;
                        return;
                    }
                },
            }
        }
        write_exit.cancel();
    });

    PumpPair { read, write }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::MessageId;
    use std::time::Duration;
    use tokio::time::timeout;

    fn packet(id: u32) -> Packet {
        let mut p = Packet::request("t", "a", "x");
        p.header.message_id = MessageId::new(id);
        p
    }

    #[tokio::test]
    async fn test_pumps_relay_both_directions() {
        // ---
        let (local, remote) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(local);

        let (in_tx, mut in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(8);
        let exit = CancellationToken::new();
        let pair = spawn_pump_pair(
            "test".into(),
            PacketReader::new(read_half),
            PacketWriter::new(write_half),
            in_tx,
            out_rx,
            exit.clone(),
        );

        let (remote_read, remote_write) = tokio::io::split(remote);
        let mut remote_reader = PacketReader::new(remote_read);
        let mut remote_writer = PacketWriter::new(remote_write);

        out_tx.send(packet(1)).await.unwrap();
        let got = remote_reader.next_packet().await.unwrap().unwrap();
        assert_eq!(got.message_id(), MessageId::new(1));

        remote_writer.write_packet(&packet(2)).await.unwrap();
        let got = timeout(Duration::from_secs(1), in_rx.recv()).await.unwrap().unwrap();
        assert_eq!(got.message_id(), MessageId::new(2));

        exit.cancel();
        timeout(Duration::from_secs(1), pair.join()).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_source_keeps_receiving() {
        // ---
        let (local, remote) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(local);

        let (in_tx, mut in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel::<Packet>(8);
        let exit = CancellationToken::new();
        let pair = spawn_pump_pair(
            "test".into(),
            PacketReader::new(read_half),
            PacketWriter::new(write_half),
            in_tx,
            out_rx,
            exit.clone(),
        );
        drop(out_tx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!exit.is_cancelled());

        let (_remote_read, remote_write) = tokio::io::split(remote);
        let mut remote_writer = PacketWriter::new(remote_write);
        remote_writer.write_packet(&packet(7)).await.unwrap();

        let got = timeout(Duration::from_secs(1), in_rx.recv()).await.unwrap().unwrap();
        assert_eq!(got.message_id(), MessageId::new(7));

        exit.cancel();
        timeout(Duration::from_secs(1), pair.join()).await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_eof_stops_both_pumps() {
        // ---
        let (local, remote) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(local);

        let (in_tx, _in_rx) = mpsc::channel::<Packet>(8);
        let (_out_tx, out_rx) = mpsc::channel::<Packet>(8);
        let exit = CancellationToken::new();
        let pair = spawn_pump_pair(
            "test".into(),
            PacketReader::new(read_half),
            PacketWriter::new(write_half),
            in_tx,
            out_rx,
            exit.clone(),
        );

        drop(remote);
        timeout(Duration::from_secs(1), pair.join()).await.unwrap();
        assert!(exit.is_cancelled());
    }

    #[tokio::test]
    async fn test_shared_source_hands_each_item_to_one_taker() {
        // ---
        let (tx, rx) = mpsc::channel(4);
        let mut a = SharedSource::new(rx);
        let mut b = a.clone();

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);

        let mut seen = vec![a.next().await.unwrap(), b.next().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
        assert!(a.next().await.is_none());
    }
}
