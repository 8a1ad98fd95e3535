//! Domain layer public interface.
//!
//! Defines how endpoints find each other: the socket address both processes
//! agree on out of band, and the dial capability the client uses to reach
//! it. Nothing here knows about packets or correlation.
//!
//! All consumers must import symbols via this module, not by referencing
//! individual files directly.

mod address;
mod dialer;

pub use address::SocketAddress;
pub use dialer::{Dialer, DialerPtr, UnixSocketDialer};
