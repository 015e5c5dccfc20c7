//! FIFO receive buffer sitting between the driver and the read API.

use super::error::ReadError;
use std::collections::VecDeque;
use std::io;
use tracing::trace;

/// Default number of bytes requested from the driver per refill.
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Ordered queue of received bytes.
///
/// Bytes leave the queue in exactly the order the driver delivered them.
/// The queue grows by at most one chunk per [`fill`](Self::fill).
#[derive(Debug)]
pub struct ReadBuffer {
    queue: VecDeque<u8>,
    chunk: Vec<u8>,
}

impl ReadBuffer {
    /// Create an empty buffer that refills `chunk_size` bytes at a time.
    ///
    /// A chunk size of zero is bumped to one.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            chunk: vec![0; chunk_size.max(1)],
        }
    }

    /// Bytes requested per refill.
    pub fn chunk_size(&self) -> usize {
        self.chunk.len()
    }

    /// Change the refill size. Buffered bytes are kept.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk.resize(chunk_size.max(1), 0);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Issue one read through `source` and append whatever it returned.
    pub fn fill<F>(&mut self, source: F) -> Result<usize, ReadError>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        let n = source(&mut self.chunk).map_err(ReadError::IoFailure)?;
        // Never trust a source to stay within the slice it was given.
        let n = n.min(self.chunk.len());
        self.queue.extend(&self.chunk[..n]);
        if n > 0 {
            trace!("Buffered {} bytes ({} queued)", n, self.queue.len());
        }
        Ok(n)
    }

    /// Remove and return the oldest byte.
    pub fn pop(&mut self) -> Option<u8> {
        self.queue.pop_front()
    }

    /// Move up to `max` bytes from the front of the queue onto `out`.
    pub fn take_into(&mut self, max: usize, out: &mut Vec<u8>) -> usize {
        let n = max.min(self.queue.len());
        out.extend(self.queue.drain(..n));
        n
    }

    /// Position of the first `delimiter` in the queue.
    pub fn find(&self, delimiter: u8) -> Option<usize> {
        let (front, back) = self.queue.as_slices();
        memchr::memchr(delimiter, front)
            .or_else(|| memchr::memchr(delimiter, back).map(|i| front.len() + i))
    }

    /// Drop the first `n` bytes.
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.queue.len());
        self.queue.drain(..n);
    }

    /// Put bytes back at the front, ahead of everything still queued.
    pub fn unread(&mut self, bytes: &[u8]) {
        for &byte in bytes.iter().rev() {
            self.queue.push_front(byte);
        }
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}
