//! Connection plumbing shared by every endpoint.
//!
//! [`pump`] drives one connection with a receive/write task pair; the
//! structured client and host plug packet strategies into it. [`raw`] plugs
//! in byte-chunk strategies for the correlation-free relay.

pub(crate) mod pump;
mod raw;

pub use raw::{RawChannelPair, RawClient, RawHost};
