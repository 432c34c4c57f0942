use std::io;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::net::unix::pipe;

use crate::resync::TS_PACKET_SIZE;

/// Default output buffer capacity, in whole packets.
pub const DEFAULT_CAPACITY_PACKETS: usize = 10_000;

/// Non-blocking downstream sink for TS bytes.
///
/// The switch never blocks on its sink: it try-writes whatever is buffered and
/// waits for writability only while there is something to deliver.
#[async_trait]
pub trait Sink {
    /// Attempts a non-blocking write, returning how many bytes were accepted.
    fn try_write(&self, data: &[u8]) -> io::Result<usize>;

    /// Resolves when the sink is ready to accept bytes again.
    async fn writable(&self) -> io::Result<()>;
}

#[async_trait]
impl Sink for pipe::Sender {
    fn try_write(&self, data: &[u8]) -> io::Result<usize> {
        pipe::Sender::try_write(self, data)
    }

    async fn writable(&self) -> io::Result<()> {
        pipe::Sender::writable(self).await
    }
}

/// Bounded accumulator of whole TS packets pending delivery to the sink.
///
/// Never holds a partial packet: `append` takes a packet entirely or drops it.
/// Delivery is best effort; an unready or broken sink causes drops upstream in
/// `append`, never an error out of the loop.
#[derive(Debug)]
pub struct OutputBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl OutputBuffer {
    /// Creates a buffer holding at most `packets` whole packets.
    pub fn with_capacity(packets: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            capacity: packets * TS_PACKET_SIZE,
        }
    }

    /// Appends one whole packet. Returns `false` when the buffer is full and
    /// the packet was dropped; the caller logs the overflow.
    pub fn append(&mut self, packet: &[u8]) -> bool {
        debug_assert_eq!(packet.len(), TS_PACKET_SIZE);
        if self.buf.len() + packet.len() > self.capacity {
            return false;
        }
        self.buf.extend_from_slice(packet);
        true
    }

    /// Discards everything buffered. Called on every active-stream change so
    /// no packet from a superseded stream reaches the sink after a switch.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes currently pending.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Attempts one non-blocking write of the buffered bytes.
    ///
    /// A partial write retains the unwritten suffix at the buffer head; a full
    /// write empties the buffer. `WouldBlock` and write errors are ignored.
    pub fn drain<S: Sink + ?Sized>(&mut self, sink: &S) {
        if self.buf.is_empty() {
            return;
        }
        if let Ok(n) = sink.try_write(&self.buf) {
            self.buf.advance(n);
        }
    }
}
