//! Client connection manager.
//!
//! [`SocketClient`] owns one logical link to a host. A background dial loop
//! keeps that link alive:
//!
//! ```text
//! Disconnected --dial--> Connecting --ok--> Connected --peer gone--> Disconnected
//!       ^                    |                                          |
//!       +---- backoff -------+ (dial failed)          (redial at once) -+
//! ```
//!
//! While connected, a receive pump resolves responses through the
//! [`Correlator`] and a write pump serializes requests in submission order.
//! When the connection drops, every caller still waiting on a response is
//! released with [`LinkError::Disconnected`].

mod builder;

pub use builder::SocketClientBuilder;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::backoff::ReconnectBackoff;
use crate::correlator::lock_ignore_poison;
use crate::protocol::{PacketReader, PacketWriter};
use crate::transport::pump::{spawn_pump_pair, ItemSink, ItemWriter};
use crate::{Correlator, DialerPtr, LinkConfig, LinkError, MessageId, Packet, Result};

/// Connection state reported by [`SocketClient::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; a dial attempt is pending or backing off.
    Disconnected,
    /// A dial attempt is in progress.
    Connecting,
    /// Requests can be sent.
    Connected,
}

/// Removes a registration when `send` returns or its future is dropped.
///
/// A resolved or failed registration is already gone, so the removal is a
/// no-op on those paths.
struct Registration<'a> {
    correlator: &'a Correlator,
    id: MessageId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.correlator.remove(self.id);
    }
}

/// A request queued for the write pump.
struct Outgoing {
    packet: Packet,
    written: oneshot::Sender<Result<()>>,
}

/// Handles for the live connection.
#[derive(Clone)]
struct Link {
    outgoing: mpsc::Sender<Outgoing>,
    exit: CancellationToken,
}

struct Inner {
    // ---
    label: String,
    dialer: DialerPtr,
    config: LinkConfig,
    correlator: Arc<Correlator>,
    link: Mutex<Option<Link>>,
    state: watch::Sender<ConnectionState>,
    closed: CancellationToken,
}

/// Request/response client for a local socket host.
///
/// Cheap to clone; clones share the same connection and pending table.
///
/// # Example
///
/// ```no_run
/// use localrpc::{LinkConfig, Packet, SocketAddress, SocketClientBuilder};
///
/// # async fn example() -> localrpc::Result<()> {
/// let client = SocketClientBuilder::new()
///     .address(SocketAddress::parse("@/tmp/localrpc.sock")?)
///     .config(LinkConfig::new("front-end"))
///     .build()?;
///
/// let reply = client.send(Packet::request("echo", "ping", "hi"), 1000).await?;
/// assert!(reply.header.ack);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<Inner>,
}

impl SocketClient {
    // ---
    /// Start a builder.
    pub fn builder() -> SocketClientBuilder {
        SocketClientBuilder::new()
    }

    pub(crate) fn spawn(dialer: DialerPtr, config: LinkConfig) -> Self {
        // ---
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let inner = Arc::new(Inner {
            label: config.label.clone(),
            correlator: Arc::new(Correlator::new(config.label.clone())),
            dialer,
            config,
            link: Mutex::new(None),
            state,
            closed: CancellationToken::new(),
        });

        tokio::spawn(dial_loop(Arc::clone(&inner)));
        Self { inner }
    }

    /// Send a request and wait for its response.
    ///
    /// A fresh message id is assigned and `Ack` is cleared before the packet
    /// is written. `timeout_ms == 0` waits without a deadline.
    ///
    /// # Errors
    ///
    /// - [`LinkError::NotConnected`] when no connection is up; nothing is written
    /// - [`LinkError::Timeout`] when no response arrives in time
    /// - [`LinkError::Disconnected`] when the connection drops first
    /// - [`LinkError::Nack`] when the response has `Ack == false`
    /// - [`LinkError::WriteFailed`] / [`LinkError::Encode`] when the request
    ///   could not be written
    pub async fn send(&self, mut packet: Packet, timeout_ms: u64) -> Result<Packet> {
        // ---
        let inner = &self.inner;
        if inner.closed.is_cancelled() {
            return Err(LinkError::Closed);
        }

        let link = lock_ignore_poison(&inner.link)
            .clone()
            .ok_or(LinkError::NotConnected)?;

        let (id, slot) = inner.correlator.register_next()?;
        let registration = Registration {
            correlator: inner.correlator.as_ref(),
            id,
        };
        packet.header.message_id = id;
        packet.header.ack = false;

        let exchange = async {
            // ---
            let (written_tx, written_rx) = oneshot::channel();
            let outgoing = Outgoing {
                packet,
                written: written_tx,
            };
            if link.outgoing.send(outgoing).await.is_err() {
                return Err(LinkError::Disconnected);
            }
            written_rx.await.map_err(|_| LinkError::Disconnected)??;
            slot.await.map_err(|_| LinkError::Disconnected)?
        };

        let outcome = if timeout_ms == 0 {
            exchange.await
        } else {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), exchange).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    crate::log_debug!(inner.label, "request {id} timed out after {timeout_ms}ms");
                    Err(LinkError::Timeout)
                }
            }
        };

        drop(registration);
        let response = outcome?;

        if !response.header.ack {
            return Err(LinkError::Nack);
        }
        Ok(response)
    }

    /// Drop the current connection.
    ///
    /// Waiting callers are released with [`LinkError::Disconnected`] and the
    /// dial loop connects again immediately.
    pub fn shutdown(&self) {
        // ---
        let link = lock_ignore_poison(&self.inner.link).clone();
        if let Some(link) = link {
            crate::log_info!(self.inner.label, "shutting down connection");
            link.exit.cancel();
        }
    }

    /// Stop the client for good: drop the connection and end the dial loop.
    pub fn close(&self) {
        // ---
        crate::log_info!(self.inner.label, "closing client");
        self.inner.closed.cancel();
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// `true` while requests can be sent.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) {
        // ---
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|state| *state == target).await;
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.len()
    }
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("label", &self.inner.label)
            .field("target", &self.inner.dialer.target())
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    // ---
    fn set_state(&self, next: ConnectionState) {
        // ---
        let previous = self.state.send_replace(next);
        if previous != next {
            crate::log_debug!(self.label, "state {previous:?} -> {next:?}");
        }
    }

    /// Drive one connection until either pump stops.
    async fn run_connection(&self, stream: UnixStream) {
        // ---
        let (read_half, write_half) = stream.into_split();
        let (outgoing, requests) = mpsc::channel(self.config.channel_capacity());
        let exit = self.closed.child_token();

        let pumps = spawn_pump_pair(
            self.label.clone(),
            PacketReader::with_max_frame_size(read_half, self.config.max_frame_size),
            RequestWriter {
                writer: PacketWriter::new(write_half),
            },
            ResponseSink {
                label: self.label.clone(),
                correlator: Arc::clone(&self.correlator),
            },
            requests,
            exit.clone(),
        );

        *lock_ignore_poison(&self.link) = Some(Link { outgoing, exit });
        self.set_state(ConnectionState::Connected);
        crate::log_info!(self.label, "connected to {}", self.dialer.target());

        pumps.join().await;

        *lock_ignore_poison(&self.link) = None;
        let released = self.correlator.fail_all();
        self.set_state(ConnectionState::Disconnected);
        crate::log_info!(
            self.label,
            "disconnected from {}, released {released} pending request(s)",
            self.dialer.target()
        );
    }
}

async fn dial_loop(inner: Arc<Inner>) {
    // ---
    let mut backoff = ReconnectBackoff::new();

    while !inner.closed.is_cancelled() {
        inner.set_state(ConnectionState::Connecting);

        let dialed = tokio::select! {
            _ = inner.closed.cancelled() => break,
            dialed = inner.dialer.dial() => dialed,
        };

        match dialed {
            Ok(stream) => {
                backoff.reset();
                inner.run_connection(stream).await;
            }
            Err(err) => {
                inner.set_state(ConnectionState::Disconnected);
                let delay = backoff.next_delay();
                crate::log_debug!(
                    inner.label,
                    "dial {} failed: {err}; retrying in {delay:?}",
                    inner.dialer.target()
                );
                tokio::select! {
                    _ = inner.closed.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    inner.correlator.fail_all();
    inner.set_state(ConnectionState::Disconnected);
    crate::log_debug!(inner.label, "dial loop stopped");
}

/// Write strategy for client requests: reports each write back to its caller.
struct RequestWriter<W> {
    writer: PacketWriter<W>,
}

#[async_trait::async_trait]
impl<W> ItemWriter for RequestWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Item = Outgoing;

    async fn write_item(&mut self, item: Outgoing) -> Result<()> {
        // ---
        match self.writer.write_packet(&item.packet).await {
            Ok(()) => {
                let _ = item.written.send(Ok(()));
                Ok(())
            }
            // Nothing reached the socket; the connection is still usable.
            Err(LinkError::Encode(err)) => {
                let _ = item.written.send(Err(LinkError::Encode(err)));
                Ok(())
            }
            Err(err) => {
                let _ = item.written.send(Err(LinkError::WriteFailed(err.to_string())));
                Err(err)
            }
        }
    }
}

/// Receive strategy for the client: every packet is a response.
struct ResponseSink {
    label: String,
    correlator: Arc<Correlator>,
}

#[async_trait::async_trait]
impl ItemSink for ResponseSink {
    type Item = Packet;

    async fn deliver(&mut self, packet: Packet) -> bool {
        // ---
        if !packet.message_id().is_valid() {
            crate::log_warn!(self.label, "dropping response with message id 0");
            return true;
        }
        self.correlator.resolve(packet);
        true
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Dialer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out one end of a socket pair per dial and keeps the other.
    struct PairDialer {
        peers: mpsc::UnboundedSender<UnixStream>,
        dials: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Dialer for PairDialer {
        async fn dial(&self) -> Result<UnixStream> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let (ours, theirs) = UnixStream::pair()?;
            let _ = self.peers.send(theirs);
            Ok(ours)
        }

        fn target(&self) -> String {
            "pair".into()
        }
    }

    fn pair_client() -> (SocketClient, mpsc::UnboundedReceiver<UnixStream>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let dialer = Arc::new(PairDialer {
            peers,
            dials: AtomicUsize::new(0),
        });
        (SocketClient::spawn(dialer, LinkConfig::new("test")), rx)
    }

    async fn with_deadline<F: std::future::Future>(fut: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(2), fut)
            .await
            .expect("test deadline")
    }

    #[tokio::test]
    async fn test_send_assigns_id_and_clears_ack() {
        // ---
        let (client, mut peers) = pair_client();
        let peer = with_deadline(peers.recv()).await.unwrap();
        with_deadline(client.wait_for_state(ConnectionState::Connected)).await;

        let (read, write) = peer.into_split();
        let mut reader = PacketReader::new(read);
        let mut writer = PacketWriter::new(write);

        let mut request = Packet::request("echo", "ping", "hi");
        request.header.ack = true;
        request.header.message_id = MessageId::new(999);

        let sender = client.clone();
        let call = tokio::spawn(async move { sender.send(request, 1000).await });

        let seen = with_deadline(reader.next_packet()).await.unwrap().unwrap();
        assert_eq!(seen.message_id(), MessageId::new(1));
        assert!(!seen.header.ack);

        writer.write_packet(&seen.respond_with("pong")).await.unwrap();
        let reply = with_deadline(call).await.unwrap().unwrap();
        assert_eq!(reply.data.as_ref(), b"pong");
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_nack_response_is_an_error() {
        // ---
        let (client, mut peers) = pair_client();
        let peer = with_deadline(peers.recv()).await.unwrap();
        with_deadline(client.wait_for_state(ConnectionState::Connected)).await;

        let (read, write) = peer.into_split();
        let mut reader = PacketReader::new(read);
        let mut writer = PacketWriter::new(write);

        let sender = client.clone();
        let call = tokio::spawn(async move {
            sender.send(Packet::request("t", "a", Vec::new()), 1000).await
        });

        let seen = with_deadline(reader.next_packet()).await.unwrap().unwrap();
        writer.write_packet(&seen).await.unwrap();

        let err = with_deadline(call).await.unwrap().unwrap_err();
        assert!(matches!(err, LinkError::Nack), "got {err:?}");
    }

    #[tokio::test]
    async fn test_shutdown_redials_immediately() {
        // ---
        let (client, mut peers) = pair_client();
        let _first = with_deadline(peers.recv()).await.unwrap();
        with_deadline(client.wait_for_state(ConnectionState::Connected)).await;

        client.shutdown();
        let _second = with_deadline(peers.recv()).await.unwrap();
        with_deadline(client.wait_for_state(ConnectionState::Connected)).await;
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        // ---
        let (client, mut peers) = pair_client();
        let _peer = with_deadline(peers.recv()).await.unwrap();
        with_deadline(client.wait_for_state(ConnectionState::Connected)).await;

        client.close();
        with_deadline(client.wait_for_state(ConnectionState::Disconnected)).await;

        let err = client
            .send(Packet::request("t", "a", Vec::new()), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Closed), "got {err:?}");
    }

    #[tokio::test]
    async fn test_cancelled_send_leaves_no_registration() {
        // ---
        let (client, mut peers) = pair_client();
        let _peer = with_deadline(peers.recv()).await.unwrap();
        with_deadline(client.wait_for_state(ConnectionState::Connected)).await;

        for _ in 0..10 {
            let call = client.send(Packet::request("echo", "ping", "hi"), 0);
            assert!(tokio::time::timeout(Duration::from_millis(20), call)
                .await
                .is_err());
        }
        assert_eq!(client.pending_requests(), 0);
    }

    /// Hands out streams whose write direction is already shut down.
    struct WriteClosedDialer {
        peers: std::sync::Mutex<Vec<std::os::unix::net::UnixStream>>,
    }

    #[async_trait::async_trait]
    impl Dialer for WriteClosedDialer {
        async fn dial(&self) -> Result<UnixStream> {
            let (ours, theirs) = std::os::unix::net::UnixStream::pair()?;
            ours.shutdown(std::net::Shutdown::Write)?;
            ours.set_nonblocking(true)?;
            lock_ignore_poison(&self.peers).push(theirs);
            Ok(UnixStream::from_std(ours)?)
        }

        fn target(&self) -> String {
            "write-closed".into()
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_and_cleaned_up() {
        // ---
        let dialer = Arc::new(WriteClosedDialer {
            peers: std::sync::Mutex::new(Vec::new()),
        });
        let client = SocketClient::spawn(dialer, LinkConfig::new("test"));
        with_deadline(client.wait_for_state(ConnectionState::Connected)).await;

        let err = with_deadline(client.send(Packet::request("echo", "ping", "hi"), 1000))
            .await
            .unwrap_err();
        assert!(
            matches!(err, LinkError::WriteFailed(_) | LinkError::Disconnected),
            "got {err:?}"
        );
        assert_eq!(client.pending_requests(), 0);

        client.close();
    }
}
