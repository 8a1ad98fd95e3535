//! Socket client builder.
//!
//! Provides a fluent builder API for configuring a [`SocketClient`].

use std::sync::Arc;

use super::SocketClient;
use crate::{DialerPtr, LinkConfig, LinkError, Result, SocketAddress, UnixSocketDialer};

/// Builder for [`SocketClient`].
///
/// Either an [`address`](Self::address) or a custom
/// [`dialer`](Self::dialer) is required; the dialer wins when both are set.
///
/// # Examples
///
/// ```no_run
/// use localrpc::{LinkConfig, SocketAddress, SocketClientBuilder};
///
/// # async fn example() -> localrpc::Result<()> {
/// let client = SocketClientBuilder::new()
///     .address(SocketAddress::parse("/run/device/control.sock")?)
///     .config(LinkConfig::new("front-end").with_queue_capacity(16))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SocketClientBuilder {
    // ---
    address: Option<SocketAddress>,
    dialer: Option<DialerPtr>,
    config: Option<LinkConfig>,
}

impl SocketClientBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host address to dial.
    pub fn address(mut self, address: SocketAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Custom dial strategy, replacing the Unix socket dialer.
    pub fn dialer(mut self, dialer: DialerPtr) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// Link configuration.
    ///
    /// Default: [`LinkConfig::default`].
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the client and start its dial loop (consumes self).
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`LinkError::InvalidAddress`] if neither an address nor a dialer was
    /// given.
    pub fn build(self) -> Result<SocketClient> {
        // ---
        let dialer: DialerPtr = match (self.dialer, self.address) {
            (Some(dialer), _) => dialer,
            (None, Some(address)) => Arc::new(UnixSocketDialer::new(address)),
            (None, None) => {
                return Err(LinkError::InvalidAddress(
                    "client needs an address or a dialer".into(),
                ))
            }
        };

        Ok(SocketClient::spawn(dialer, self.config.unwrap_or_default()))
    }
}
