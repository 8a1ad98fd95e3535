//! Request/response messaging between two co-located processes over a local
//! stream socket.
//!
//! One process runs a [`SocketHost`]; the other runs a [`SocketClient`] that
//! dials it, redials with backoff when the link drops, and matches each
//! response to its request by [`MessageId`]. Packets travel as back-to-back
//! JSON values:
//!
//! ```text
//! {"Header":{"MsgId":7,"Target":"echo","Action":"ping","Ack":false},"Data":"aGk="}
//! ```
//!
//! [`RawClient`] and [`RawHost`] offer the same socket handling without
//! framing or correlation, relaying opaque byte chunks.
//!

// Import all sub modules once...
mod macros;

mod backoff;
mod client;
mod correlator;
mod domain;
mod error;
mod link_config;
mod protocol;
mod server;
mod transport;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::{ConnectionState, SocketClient, SocketClientBuilder};
pub use server::{Dispatch, PacketQueues, SocketHost};
pub use transport::{RawChannelPair, RawClient, RawHost};

pub use backoff::{next_delay_ms, ReconnectBackoff, MAX_RECONNECT_DELAY};
pub use correlator::{Correlator, ResponseSlot};
pub use error::{LinkError, Result};
pub use link_config::LinkConfig;

// --- public re-exports
pub use domain::{
    //
    Dialer,
    DialerPtr,
    SocketAddress,
    UnixSocketDialer,
};

pub use protocol::{
    //
    encode_packet,
    Header,
    MessageId,
    Packet,
    PacketReader,
    PacketWriter,
    DEFAULT_MAX_FRAME_SIZE,
};
