use bytes::{Buf, Bytes, BytesMut};

/// Size of one transport-stream packet in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// Leading byte of every valid TS packet.
pub const SYNC_BYTE: u8 = 0x47;

/// Aligns a raw byte stream to whole 188-byte TS packets.
///
/// Producers deliver arbitrary read-sized chunks which rarely fall on packet
/// boundaries, and a feed joined mid-stream (or corrupted in transit) may not
/// start on a sync byte at all. The resynchronizer emits only whole packets
/// beginning with 0x47, discards bytes until sync is regained, and carries any
/// trailing partial packet over to the next call. That remainder is the only
/// state kept between calls. No CRC or PID inspection happens here.
#[derive(Debug, Default)]
pub struct Resynchronizer {
    buf: BytesMut,
}

impl Resynchronizer {
    /// Creates an empty resynchronizer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(2 * TS_PACKET_SIZE),
        }
    }

    /// Appends newly read bytes and returns every whole packet now available.
    ///
    /// While at least a packet's worth of bytes is buffered: if the head byte
    /// is the sync byte, a packet is split off; otherwise bytes are dropped up
    /// to the next sync byte (or entirely, when none remains). Anything shorter
    /// than a full packet stays buffered for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(data);

        let mut packets = Vec::new();
        while self.buf.len() >= TS_PACKET_SIZE {
            if self.buf[0] == SYNC_BYTE {
                packets.push(self.buf.split_to(TS_PACKET_SIZE).freeze());
            } else {
                // Lost sync: skip to the next candidate sync byte.
                match self.buf.iter().position(|&b| b == SYNC_BYTE) {
                    Some(pos) => self.buf.advance(pos),
                    None => self.buf.clear(),
                }
            }
        }
        packets
    }

    /// Number of carried-over bytes not yet forming a whole packet.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
