//! Streaming packet codec.
//!
//! Packets are written as one JSON object each, newline-terminated. The
//! reader does not depend on the newline: it parses whatever is buffered and
//! uses the object boundary to find where the next packet starts, so a peer
//! that emits values back-to-back without separators is read correctly too.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Packet;
use crate::{LinkError, Result};

/// Largest encoded packet the reader will buffer (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const READ_RESERVE: usize = 4 * 1024;

/// Serialize one packet to its wire form.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>> {
    // ---
    let mut bytes = serde_json::to_vec(packet).map_err(LinkError::Encode)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Incremental packet decoder over an async byte stream.
#[derive(Debug)]
pub struct PacketReader<R> {
    reader: R,
    buf: BytesMut,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    // ---
    /// Create a reader with the default frame size limit.
    pub fn new(reader: R) -> Self {
        Self::with_max_frame_size(reader, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a reader that rejects packets larger than `max_frame_size`.
    pub fn with_max_frame_size(reader: R, max_frame_size: usize) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_RESERVE),
            max_frame_size,
        }
    }

    /// Read the next packet from the stream.
    ///
    /// Returns `Ok(None)` when the peer closed the stream between packets.
    /// A stream that ends inside a packet yields [`LinkError::Truncated`];
    /// bytes that are not a packet yield [`LinkError::Decode`]. A packet with
    /// the invalid id is still returned; rejecting it is the caller's call.
    pub async fn next_packet(&mut self) -> Result<Option<Packet>> {
        // ---
        loop {
            if let Some(packet) = self.try_decode()? {
                return Ok(Some(packet));
            }

            self.buf.reserve(READ_RESERVE);
            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                return if self.buf.iter().all(u8::is_ascii_whitespace) {
                    Ok(None)
                } else {
                    Err(LinkError::Truncated(self.buf.len()))
                };
            }
        }
    }

    /// Try to decode one packet from the buffered bytes.
    fn try_decode(&mut self) -> Result<Option<Packet>> {
        // ---
        let skip = self
            .buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buf.advance(skip);

        if self.buf.is_empty() {
            return Ok(None);
        }

        let decoded = {
            let mut values = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Packet>();
            match values.next() {
                Some(Ok(packet)) => Some((packet, values.byte_offset())),
                Some(Err(e)) if e.is_eof() => None,
                Some(Err(e)) => return Err(LinkError::Decode(e)),
                None => None,
            }
        };

        match decoded {
            Some((packet, consumed)) => {
                self.buf.advance(consumed);
                Ok(Some(packet))
            }
            None if self.buf.len() > self.max_frame_size => Err(LinkError::FrameTooLarge {
                limit: self.max_frame_size,
            }),
            None => Ok(None),
        }
    }
}

/// Packet encoder over an async byte sink.
#[derive(Debug)]
pub struct PacketWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    // ---
    /// Wrap a byte sink.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Encode and write one packet, flushing it to the peer.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        // ---
        let bytes = encode_packet(packet)?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut down the write direction of the underlying sink.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::MessageId;

    fn packet(id: u32, data: &'static str) -> Packet {
        let mut p = Packet::request("echo", "ping", data);
        p.header.message_id = MessageId::new(id);
        p
    }

    /// Feed `bytes` through a duplex pipe that moves at most `chunk` bytes per read.
    fn chunked_reader(bytes: Vec<u8>, chunk: usize) -> PacketReader<tokio::io::DuplexStream> {
        let (mut tx, rx) = tokio::io::duplex(chunk);
        tokio::spawn(async move {
            let _ = tx.write_all(&bytes).await;
        });
        PacketReader::new(rx)
    }

    #[tokio::test]
    async fn test_back_to_back_values_without_separator() {
        // ---
        let mut bytes = serde_json::to_vec(&packet(1, "a")).unwrap();
        bytes.extend(serde_json::to_vec(&packet(2, "b")).unwrap());
        bytes.extend(serde_json::to_vec(&packet(3, "c")).unwrap());

        let mut reader = PacketReader::new(&bytes[..]);
        for id in 1..=3 {
            let p = reader.next_packet().await.unwrap().unwrap();
            assert_eq!(p.message_id(), MessageId::new(id));
        }
        assert!(reader.next_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reassembles_packet_split_across_reads() {
        // ---
        let mut bytes = encode_packet(&packet(7, "split me")).unwrap();
        bytes.extend(encode_packet(&packet(8, "and me")).unwrap());

        let mut reader = chunked_reader(bytes, 3);
        let first = reader.next_packet().await.unwrap().unwrap();
        let second = reader.next_packet().await.unwrap().unwrap();

        assert_eq!(first.data, bytes::Bytes::from_static(b"split me"));
        assert_eq!(second.message_id(), MessageId::new(8));
        assert!(reader.next_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        // ---
        let bytes = encode_packet(&packet(1, "cut")).unwrap();
        let cut = &bytes[..bytes.len() / 2];

        let mut reader = PacketReader::new(cut);
        assert!(matches!(
            reader.next_packet().await,
            Err(LinkError::Truncated(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_bytes_are_a_decode_error() {
        // ---
        let mut reader = PacketReader::new(&b"{\"Header\": nope}"[..]);
        assert!(matches!(
            reader.next_packet().await,
            Err(LinkError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_id_packet_is_returned_not_rejected() {
        // ---
        let mut reader = PacketReader::new(&b"{} "[..]);
        let p = reader.next_packet().await.unwrap().unwrap();
        assert!(!p.message_id().is_valid());
    }

    #[tokio::test]
    async fn test_oversized_packet_rejected() {
        // ---
        let bytes = encode_packet(&packet(1, "0123456789abcdef0123456789abcdef")).unwrap();
        let mut reader = PacketReader::with_max_frame_size(&bytes[..bytes.len() - 4], 16);
        assert!(matches!(
            reader.next_packet().await,
            Err(LinkError::FrameTooLarge { limit: 16 })
        ));
    }

    #[tokio::test]
    async fn test_writer_output_reads_back() {
        // ---
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = PacketWriter::new(client);
        let mut reader = PacketReader::new(server);

        writer.write_packet(&packet(5, "hello")).await.unwrap();
        writer.shutdown().await.unwrap();

        let p = reader.next_packet().await.unwrap().unwrap();
        assert_eq!(p, packet(5, "hello"));
        assert!(reader.next_packet().await.unwrap().is_none());
    }
}
