//! Server listener and connection pump.
//!
//! [`SocketHost`] binds a local socket and serves one peer at a time. Every
//! request read from the peer lands on the shared inbound queue; every
//! packet the application puts on the outbound queue is written to the
//! current peer. Packets queued while no peer is connected wait for the next
//! one.
//!
//! The application either drains [`PacketQueues`] itself or hands them to
//! [`SocketHost::serve`] together with a [`Dispatch`] implementation.

mod handler;

pub use handler::Dispatch;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::protocol::{PacketReader, PacketWriter};
use crate::transport::pump::{spawn_pump_pair, ItemSink, SharedSource};
use crate::{LinkConfig, Packet, Result, SocketAddress};

/// Application side of a host.
#[derive(Debug)]
pub struct PacketQueues {
    // ---
    /// Requests received from the peer, never with message id 0. Yields
    /// `None` once the host has stopped.
    pub inbound: mpsc::Receiver<Packet>,

    /// Packets to write to the current (or next) peer.
    pub outbound: mpsc::Sender<Packet>,
}

struct HostInner {
    // ---
    label: String,
    address: SocketAddress,
    ready: AtomicBool,
    connected: AtomicBool,
    shutdown: CancellationToken,
}

/// Listener for the request/response protocol.
///
/// # Example
///
/// ```no_run
/// use bytes::Bytes;
/// use localrpc::{LinkConfig, SocketAddress, SocketHost};
///
/// # async fn example() -> localrpc::Result<()> {
/// let address = SocketAddress::parse("@/tmp/localrpc.sock")?;
/// let (host, queues) = SocketHost::bind(address, LinkConfig::new("device")).await?;
///
/// let serving = host.serve(queues, |target: String, action: String, _payload: Bytes| async move {
///     match (target.as_str(), action.as_str()) {
///         ("echo", "ping") => Ok::<_, localrpc::LinkError>(Bytes::from_static(b"pong")),
///         _ => Ok(Bytes::new()),
///     }
/// });
/// serving.await.ok();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SocketHost {
    inner: Arc<HostInner>,
}

impl SocketHost {
    // ---
    /// Bind `address` and start the accept loop.
    ///
    /// A stale socket file at `address` is removed first.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn bind(address: SocketAddress, config: LinkConfig) -> Result<(Self, PacketQueues)> {
        // ---
        let listener = address.bind()?;
        crate::log_info!(config.label, "listening on {address}");

        let (inbound_tx, inbound) = mpsc::channel(config.channel_capacity());
        let (outbound, outbound_rx) = mpsc::channel(config.channel_capacity());

        let inner = Arc::new(HostInner {
            label: config.label.clone(),
            address,
            ready: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(accept_loop(
            Arc::clone(&inner),
            listener,
            config,
            inbound_tx,
            SharedSource::new(outbound_rx),
        ));

        Ok((Self { inner }, PacketQueues { inbound, outbound }))
    }

    /// `true` while the listener is waiting for a peer.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// `true` while a peer is being served.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Stop accepting, drop the current peer and remove the socket file.
    pub fn shutdown(&self) {
        // ---
        crate::log_info!(self.inner.label, "host shutdown");
        self.inner.stop();
    }

    /// Wait until the host stops, by [`shutdown`](Self::shutdown) or a
    /// fatal accept error.
    pub async fn stopped(&self) {
        self.inner.shutdown.cancelled().await;
    }

    /// Answer every inbound request with `dispatcher` until the host stops.
    ///
    /// Each request is dispatched on its own task, so responses may be
    /// written in a different order than the requests arrived. A dispatch
    /// error is logged and answered with an acknowledged, empty response.
    pub fn serve<D: Dispatch>(&self, queues: PacketQueues, dispatcher: D) -> JoinHandle<()> {
        // ---
        let label = self.inner.label.clone();
        tokio::spawn(handler::serve_requests(label, queues, Arc::new(dispatcher)))
    }
}

impl std::fmt::Debug for SocketHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketHost")
            .field("label", &self.inner.label)
            .field("address", &self.inner.address)
            .field("ready", &self.is_ready())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl HostInner {
    // ---
    fn stop(&self) {
        self.shutdown.cancel();
        self.address.cleanup();
    }

    /// An accept error is fatal: stop the host as if shut down.
    fn accept_failed(&self, err: &std::io::Error) {
        crate::log_error!(self.label, "accept failed, host stopping: {err}");
        self.stop();
    }
}

async fn accept_loop(
    inner: Arc<HostInner>,
    listener: UnixListener,
    config: LinkConfig,
    inbound: mpsc::Sender<Packet>,
    outbound: SharedSource<Packet>,
) {
    // ---
    loop {
        inner.ready.store(true, Ordering::Release);
        let accepted = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        inner.ready.store(false, Ordering::Release);

        let stream = match accepted {
            Ok((stream, _)) => stream,
            Err(err) => {
                inner.accept_failed(&err);
                break;
            }
        };

        inner.connected.store(true, Ordering::Release);
        crate::log_info!(inner.label, "peer connected");

        let (read_half, write_half) = stream.into_split();
        let pumps = spawn_pump_pair(
            inner.label.clone(),
            PacketReader::with_max_frame_size(read_half, config.max_frame_size),
            PacketWriter::new(write_half),
            RequestSink {
                label: inner.label.clone(),
                inbound: inbound.clone(),
            },
            outbound.clone(),
            inner.shutdown.child_token(),
        );
        pumps.join().await;

        inner.connected.store(false, Ordering::Release);
        crate::log_info!(inner.label, "peer disconnected");
    }

    inner.ready.store(false, Ordering::Release);
    crate::log_debug!(inner.label, "accept loop stopped");
}

/// Receive strategy for the host: forwards requests, drops id 0.
struct RequestSink {
    label: String,
    inbound: mpsc::Sender<Packet>,
}

#[async_trait::async_trait]
impl ItemSink for RequestSink {
    type Item = Packet;

    async fn deliver(&mut self, packet: Packet) -> bool {
        // ---
        if !packet.message_id().is_valid() {
            crate::log_warn!(
                self.label,
                "dropping packet with message id 0 ({}/{})",
                packet.header.target,
                packet.header.action
            );
            return true;
        }
        self.inbound.send(packet).await.is_ok()
    }
}
