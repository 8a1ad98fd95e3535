//! Wire protocol for the structured link.
//!
//! A [`Packet`] is a header plus an opaque payload. Packets travel as a
//! back-to-back sequence of JSON objects with no length prefix; the decoder
//! finds each packet's end from the object boundary itself.

mod codec;
mod message_id;
mod packet;

pub use codec::{encode_packet, PacketReader, PacketWriter, DEFAULT_MAX_FRAME_SIZE};
pub use message_id::MessageId;
pub use packet::{Header, Packet};
