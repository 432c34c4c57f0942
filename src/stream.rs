use std::future::Future;
use std::pin::Pin;

use tokio::time::Instant;

use crate::producer::Producer;
use crate::resync::{Resynchronizer, TS_PACKET_SIZE};

/// Read chunk size for one non-blocking read from a producer.
pub const READ_CHUNK: usize = TS_PACKET_SIZE + 1024;

/// Outcome of one non-blocking read attempt on a stream.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read.
    Data(usize),
    /// The producer's pipe reached end-of-stream or errored.
    Closed,
    /// The pipe is open but has nothing to read right now.
    NotReady,
    /// The stream has no running producer.
    NotRunning,
}

/// One ranked input: a producer process, its packet resynchronizer and the
/// deadline by which it must show signs of life.
#[derive(Debug)]
pub struct Stream {
    /// Fixed position in priority order; 0 is the highest priority.
    pub rank: usize,
    /// The external process feeding this stream.
    pub producer: Producer,
    /// Packet aligner carrying this stream's partial-packet remainder.
    pub resync: Resynchronizer,
    /// When this stream is next considered stalled (or retried if stopped).
    pub deadline: Instant,
}

impl Stream {
    /// Creates a stopped stream at the given rank.
    pub fn new(rank: usize, argv: Vec<String>, deadline: Instant) -> Self {
        Self {
            rank,
            producer: Producer::new(argv),
            resync: Resynchronizer::new(),
            deadline,
        }
    }

    /// Whether the producer is currently running.
    pub fn is_running(&self) -> bool {
        self.producer.is_running()
    }

    /// One non-blocking read into `buf`.
    pub fn try_read(&self, buf: &mut [u8]) -> ReadOutcome {
        match self.producer.try_read(buf) {
            None => ReadOutcome::NotRunning,
            Some(Ok(0)) => ReadOutcome::Closed,
            Some(Ok(n)) => ReadOutcome::Data(n),
            Some(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => ReadOutcome::NotReady,
            Some(Err(_)) => ReadOutcome::Closed,
        }
    }

    /// Future that resolves when this stream needs attention: its pipe became
    /// readable or its producer exited. `None` when the stream is stopped.
    pub(crate) fn event(&mut self) -> Option<Pin<Box<dyn Future<Output = ()> + '_>>> {
        let (rx, child) = self.producer.event_parts()?;
        let event: Pin<Box<dyn Future<Output = ()> + '_>> = match child {
            Some(child) => Box::pin(async move {
                tokio::select! {
                    _ = rx.readable() => {}
                    _ = child.wait() => {}
                }
            }),
            // Already reaped: only the pipe drain remains.
            None => Box::pin(async move {
                let _ = rx.readable().await;
            }),
        };
        Some(event)
    }
}
