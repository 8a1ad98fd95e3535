//! Endpoint configuration shared by every link type.
//!
//! This type carries no address: each endpoint constructor takes its
//! [`SocketAddress`](crate::SocketAddress) separately, so one config can be
//! reused for a client and a host.

use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Tuning knobs for clients, hosts and raw relays.
///
/// # Example
///
/// ```
/// use localrpc::LinkConfig;
///
/// let config = LinkConfig::new("front-end")
///     .with_queue_capacity(128)
///     .with_chunk_size(4096);
/// assert_eq!(config.label, "front-end");
/// ```
#[derive(Debug, Clone)]
pub struct LinkConfig {
    // ---
    /// Name carried by every log line the endpoint emits.
    pub label: String,

    /// Capacity of each bounded queue (inbound, outbound, per-connection
    /// writer queue).
    ///
    /// Default: 64
    pub queue_capacity: usize,

    /// Largest chunk a raw relay receive pump reads in one call.
    ///
    /// Default: 1024 bytes
    pub chunk_size: usize,

    /// Largest encoded packet the structured reader will buffer before
    /// treating the stream as corrupt.
    ///
    /// Default: 16 MB
    pub max_frame_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new("localrpc")
    }
}

impl LinkConfig {
    // ---
    /// Default configuration with the given log label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            queue_capacity: 64,
            chunk_size: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the bounded queue capacity (minimum 1).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the raw relay read chunk size (minimum 1).
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Capacity to create bounded queues with; never zero, even when
    /// `queue_capacity` was assigned directly.
    pub fn channel_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Set the structured reader's packet size limit.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}
