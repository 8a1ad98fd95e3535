//! Dial abstraction for the client connection manager.

use std::sync::Arc;

use tokio::net::UnixStream;

use super::SocketAddress;
use crate::Result;

/// One connection attempt.
///
/// The client's dial loop calls [`dial`](Dialer::dial) once per attempt and
/// applies its own backoff between failures; implementations must not retry
/// internally.
///
/// # Notes
///
/// This trait uses `async_trait`; treat `dial` as a normal `async fn`.
#[async_trait::async_trait]
pub trait Dialer: Send + Sync {
    /// Try once to open a stream to the host.
    async fn dial(&self) -> Result<UnixStream>;

    /// Human-readable description of the dial target, for logs.
    fn target(&self) -> String;
}

/// Shared dialer pointer.
pub type DialerPtr = Arc<dyn Dialer>;

/// Dials a [`SocketAddress`].
#[derive(Debug, Clone)]
pub struct UnixSocketDialer {
    address: SocketAddress,
}

impl UnixSocketDialer {
    /// Dialer for `address`.
    pub fn new(address: SocketAddress) -> Self {
        Self { address }
    }
}

#[async_trait::async_trait]
impl Dialer for UnixSocketDialer {
    async fn dial(&self) -> Result<UnixStream> {
        Ok(self.address.connect().await?)
    }

    fn target(&self) -> String {
        self.address.to_string()
    }
}
