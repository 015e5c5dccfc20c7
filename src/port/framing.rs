//! Byte and line framing over a [`ReadBuffer`].
//!
//! A [`Reader`] borrows the buffer together with a byte source (normally the
//! driver's read primitive bound to an open handle) for the duration of one
//! read call. The buffer is refilled lazily: the source is only asked for more
//! bytes when the queue runs dry.
//!
//! Running out of data is never an error for [`Reader::read_bytes`] or
//! [`Reader::read_line`]; they return what they have. Only
//! [`Reader::next_byte`] surfaces a [`ReadError::Timeout`], and only when a
//! timeout is configured.

use super::buffer::ReadBuffer;
use super::error::ReadError;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// Sleep between refill attempts while waiting for data.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) struct Reader<'a, F> {
    buffer: &'a mut ReadBuffer,
    source: F,
    timeout: Option<Duration>,
}

impl<'a, F> Reader<'a, F>
where
    F: FnMut(&mut [u8]) -> io::Result<usize>,
{
    pub(crate) fn new(buffer: &'a mut ReadBuffer, source: F, timeout: Option<Duration>) -> Self {
        Self {
            buffer,
            source,
            timeout,
        }
    }

    /// One refill from the source.
    pub(crate) fn fill(&mut self) -> Result<usize, ReadError> {
        self.buffer.fill(&mut self.source)
    }

    /// Make sure at least one byte is queued.
    ///
    /// Returns `Ok(false)` when untimed and a single refill produced nothing.
    /// When timed, keeps refilling until data arrives or the timeout elapses.
    fn wait_for_data(&mut self) -> Result<bool, ReadError> {
        if !self.buffer.is_empty() {
            return Ok(true);
        }
        self.fill()?;
        if !self.buffer.is_empty() {
            return Ok(true);
        }

        let Some(timeout) = self.timeout else {
            return Ok(false);
        };
        // A timeout too large to represent as an instant never expires.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ReadError::Timeout(timeout));
                    }
                    POLL_INTERVAL.min(deadline - now)
                }
                None => POLL_INTERVAL,
            };
            thread::sleep(pause);
            self.fill()?;
            if !self.buffer.is_empty() {
                return Ok(true);
            }
        }
    }

    /// Pop the next byte, refilling if the queue is empty.
    pub(crate) fn next_byte(&mut self) -> Result<Option<u8>, ReadError> {
        if self.wait_for_data()? {
            Ok(self.buffer.pop())
        } else {
            Ok(None)
        }
    }

    /// Up to `max` bytes. Short reads are normal.
    pub(crate) fn read_bytes(&mut self, max: usize) -> Result<Vec<u8>, ReadError> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.wait_for_data() {
                Ok(true) => {
                    self.buffer.take_into(max - out.len(), &mut out);
                }
                Ok(false) | Err(ReadError::Timeout(_)) => break,
                Err(e) => {
                    self.buffer.unread(&out);
                    return Err(e);
                }
            }
        }
        Ok(out)
    }

    /// Bytes up to the next `\n`, without the delimiter.
    ///
    /// A `\r` right before the `\n` is dropped too. If the data runs out first,
    /// whatever was collected is returned unchanged.
    pub(crate) fn read_line(&mut self) -> Result<Vec<u8>, ReadError> {
        self.scan_line().map(|(line, _)| line)
    }

    /// Like [`read_line`](Self::read_line), but only yields terminated lines.
    ///
    /// When the data runs out first, the partial line goes back into the
    /// buffer and `Ok(None)` is returned, so the next call picks it up again.
    pub(crate) fn read_complete_line(&mut self) -> Result<Option<Vec<u8>>, ReadError> {
        match self.scan_line()? {
            (line, true) => Ok(Some(line)),
            (partial, false) => {
                self.buffer.unread(&partial);
                Ok(None)
            }
        }
    }

    /// Collect bytes up to a `\n`. The flag says whether the terminator was
    /// seen or the data ran out.
    fn scan_line(&mut self) -> Result<(Vec<u8>, bool), ReadError> {
        let mut line = Vec::new();
        loop {
            match self.wait_for_data() {
                Ok(true) => {}
                Ok(false) | Err(ReadError::Timeout(_)) => return Ok((line, false)),
                Err(e) => {
                    self.buffer.unread(&line);
                    return Err(e);
                }
            }

            if let Some(end) = self.buffer.find(b'\n') {
                self.buffer.take_into(end, &mut line);
                self.buffer.discard(1);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok((line, true));
            }
            let queued = self.buffer.len();
            self.buffer.take_into(queued, &mut line);
        }
    }

    /// One refill, then the number of queued bytes.
    pub(crate) fn available(&mut self) -> Result<usize, ReadError> {
        self.fill()?;
        Ok(self.buffer.len())
    }
}
