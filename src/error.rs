use thiserror::Error;

use crate::MessageId;

/// Errors that can occur on a local link.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The client has no live connection to the host.
    #[error("client is not connected to host, unable to send")]
    NotConnected,

    /// No response arrived within the requested timeout.
    #[error("timed out waiting for response")]
    Timeout,

    /// The connection dropped while the request was outstanding.
    #[error("connection lost while waiting for response")]
    Disconnected,

    /// The peer answered but did not acknowledge the packet.
    #[error("peer replied but did not ack packet")]
    Nack,

    /// A request with this message id is already outstanding.
    #[error("message id {0} is already in flight")]
    DuplicateMessageId(MessageId),

    /// Zero is reserved and cannot identify a request.
    #[error("message id 0 is reserved")]
    InvalidMessageId,

    /// Every non-zero message id is currently in flight.
    #[error("no free message id available")]
    IdsExhausted,

    /// The endpoint was closed and accepts no further work.
    #[error("link closed")]
    Closed,

    /// The byte stream did not contain a valid packet.
    #[error("failed to decode packet: {0}")]
    Decode(#[source] serde_json::Error),

    /// A packet could not be serialized.
    #[error("failed to encode packet: {0}")]
    Encode(#[source] serde_json::Error),

    /// The peer closed the stream in the middle of a packet.
    #[error("stream ended inside a packet ({0} bytes buffered)")]
    Truncated(usize),

    /// A single packet grew beyond the configured limit.
    #[error("packet exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured maximum encoded packet size.
        limit: usize,
    },

    /// Writing the encoded packet to the socket failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Socket level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket address could not be used.
    #[error("invalid socket address: {0}")]
    InvalidAddress(String),

    /// The business-logic dispatcher reported a failure.
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

/// Result type alias for link operations
pub type Result<T> = std::result::Result<T, LinkError>;
