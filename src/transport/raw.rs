//! Raw stream relay.
//!
//! A correlation-free variant of the link: bytes read from the socket are
//! forwarded to the application as opaque chunks, and chunks the
//! application queues are written to the socket verbatim. Chunk boundaries
//! carry no meaning; a chunk is whatever one read returned, up to
//! [`LinkConfig::chunk_size`].
//!
//! Unlike [`SocketClient`](crate::SocketClient), [`RawClient`] connects once
//! and never redials. [`RawHost`] accepts any number of concurrent peers;
//! all of them feed the same inbound queue and drain the same outbound
//! queue.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::pump::{spawn_pump_pair, ItemReader, ItemWriter, SharedSource};
use crate::{LinkConfig, Result, SocketAddress};

/// Application side of a raw relay.
#[derive(Debug)]
pub struct RawChannelPair {
    // ---
    /// Chunks read from the peer(s). Yields `None` once every connection
    /// feeding it has stopped.
    pub inbound: mpsc::Receiver<Bytes>,

    /// Chunks to write to the peer.
    pub outbound: mpsc::Sender<Bytes>,
}

struct ChunkReader {
    half: OwnedReadHalf,
    buf: Vec<u8>,
}

#[async_trait::async_trait]
impl ItemReader for ChunkReader {
    type Item = Bytes;

    async fn next_item(&mut self) -> Result<Option<Bytes>> {
        // ---
        let n = self.half.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(&self.buf[..n])))
    }
}

struct ChunkWriter {
    half: OwnedWriteHalf,
}

#[async_trait::async_trait]
impl ItemWriter for ChunkWriter {
    type Item = Bytes;

    async fn write_item(&mut self, item: Bytes) -> Result<()> {
        // ---
        self.half.write_all(&item).await?;
        self.half.flush().await?;
        Ok(())
    }
}

fn chunk_halves(stream: tokio::net::UnixStream, chunk_size: usize) -> (ChunkReader, ChunkWriter) {
    let (read, write) = stream.into_split();
    (
        ChunkReader {
            half: read,
            buf: vec![0; chunk_size.max(1)],
        },
        ChunkWriter { half: write },
    )
}

// --------------------
// Client
// --------------------

/// One-shot raw connection to a host.
#[derive(Debug)]
pub struct RawClient {
    // ---
    label: String,
    exit: CancellationToken,
}

impl RawClient {
    // ---
    /// Connect once to `address` and start relaying.
    ///
    /// # Errors
    ///
    /// Returns the dial error; no retry is attempted.
    pub async fn connect(
        address: &SocketAddress,
        config: LinkConfig,
    ) -> Result<(Self, RawChannelPair)> {
        // ---
        let stream = match address.connect().await {
            Ok(stream) => stream,
            Err(err) => {
                crate::log_warn!(config.label, "raw connect to {address} failed: {err}");
                return Err(err.into());
            }
        };
        crate::log_info!(config.label, "raw link connected to {address}");

        let (in_tx, in_rx) = mpsc::channel(config.channel_capacity());
        let (out_tx, out_rx) = mpsc::channel(config.channel_capacity());
        let (reader, writer) = chunk_halves(stream, config.chunk_size);

        let exit = CancellationToken::new();
        let _pumps = spawn_pump_pair(
            config.label.clone(),
            reader,
            writer,
            in_tx,
            out_rx,
            exit.clone(),
        );

        let client = Self {
            label: config.label,
            exit,
        };
        let channels = RawChannelPair {
            inbound: in_rx,
            outbound: out_tx,
        };
        Ok((client, channels))
    }

    /// `true` until the connection has stopped for any reason.
    pub fn is_connected(&self) -> bool {
        !self.exit.is_cancelled()
    }

    /// Wait until the connection stops.
    pub async fn closed(&self) {
        self.exit.cancelled().await;
    }

    /// Close the connection.
    pub fn shutdown(&self) {
        // ---
        crate::log_debug!(self.label, "raw client shutdown");
        self.exit.cancel();
    }
}

// --------------------
// Host
// --------------------

/// Listener bridging every accepted peer to one pair of queues.
#[derive(Debug)]
pub struct RawHost {
    // ---
    label: String,
    address: SocketAddress,
    shutdown: CancellationToken,
}

impl RawHost {
    // ---
    /// Bind `address` and start accepting peers.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn listen(
        address: SocketAddress,
        config: LinkConfig,
    ) -> Result<(Self, RawChannelPair)> {
        // ---
        let listener = address.bind()?;
        crate::log_info!(config.label, "raw host listening on {address}");

        let (in_tx, in_rx) = mpsc::channel(config.channel_capacity());
        let (out_tx, out_rx) = mpsc::channel(config.channel_capacity());

        let shutdown = CancellationToken::new();
        tokio::spawn(accept_loop(
            listener,
            address.clone(),
            config.clone(),
            in_tx,
            SharedSource::new(out_rx),
            shutdown.clone(),
        ));

        let host = Self {
            label: config.label,
            address,
            shutdown,
        };
        let channels = RawChannelPair {
            inbound: in_rx,
            outbound: out_tx,
        };
        Ok((host, channels))
    }

    /// `true` until the host has been shut down or its listener failed.
    pub fn is_listening(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stop accepting, close every peer and remove the socket file.
    pub fn shutdown(&self) {
        // ---
        crate::log_debug!(self.label, "raw host shutdown");
        stop_listening(&self.shutdown, &self.address);
    }
}

/// Stop the accept loop and every peer, and remove the socket file.
fn stop_listening(shutdown: &CancellationToken, address: &SocketAddress) {
    shutdown.cancel();
    address.cleanup();
}

async fn accept_loop(
    listener: UnixListener,
    address: SocketAddress,
    config: LinkConfig,
    inbound: mpsc::Sender<Bytes>,
    outbound: SharedSource<Bytes>,
    shutdown: CancellationToken,
) {
    // ---
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, _)) => {
                crate::log_info!(config.label, "raw peer connected");
                let (reader, writer) = chunk_halves(stream, config.chunk_size);
                let _pumps = spawn_pump_pair(
                    config.label.clone(),
                    reader,
                    writer,
                    inbound.clone(),
                    outbound.clone(),
                    shutdown.child_token(),
                );
            }
            Err(err) => {
                crate::log_error!(config.label, "accept failed, raw host stopping: {err}");
                stop_listening(&shutdown, &address);
                break;
            }
        }
    }
}
