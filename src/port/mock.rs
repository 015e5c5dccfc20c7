//! In-memory serial driver for testing.
//!
//! [`LoopbackDriver`] simulates a device without hardware. Written bytes can be
//! looped back into the receive queue, reads can be chopped into small
//! deliveries, and every primitive can be made to fail once. Clones share
//! state, so a test can keep one clone for inspection after handing another
//! to a [`Port`](super::Port).

use super::baud::BaudRate;
use super::driver::{LineSettings, SerialDriver};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// A driver primitive that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Acquire,
    Configure,
    Read,
    Write,
    Release,
}

/// Handle given out by [`LoopbackDriver::acquire`].
#[derive(Debug, PartialEq, Eq)]
pub struct LoopbackHandle {
    id: u64,
}

impl LoopbackHandle {
    /// Sequence number of this acquisition, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Default)]
struct LoopbackState {
    /// Bytes waiting to be returned by reads.
    rx: VecDeque<u8>,
    /// Every successful write, in order.
    write_log: Vec<Vec<u8>>,
    /// Feed written bytes back into `rx`.
    loopback: bool,
    /// Largest number of bytes a single read returns.
    read_chunk: Option<usize>,
    /// Largest number of bytes a single write accepts.
    write_chunk: Option<usize>,
    /// One-shot failures with the number of calls to let through first.
    faults: Vec<(Fault, usize)>,
    acquire_calls: usize,
    configure_calls: usize,
    read_calls: usize,
    release_calls: usize,
    last_path: Option<String>,
    last_settings: Option<LineSettings>,
    live_handles: usize,
}

impl LoopbackState {
    fn take_fault(&mut self, fault: Fault) -> io::Result<()> {
        let Some(index) = self.faults.iter().position(|(f, _)| *f == fault) else {
            return Ok(());
        };
        let skip = &mut self.faults[index].1;
        if *skip > 0 {
            *skip -= 1;
            return Ok(());
        }
        self.faults.remove(index);
        Err(io::Error::other(format!("injected {:?} fault", fault)))
    }
}

/// In-memory driver with optional loopback.
///
/// # Example
/// ```
/// use serial_line::port::{LoopbackDriver, Port};
///
/// let driver = LoopbackDriver::new();
/// let port = Port::with_driver(driver.clone(), "LOOP", 115200);
/// port.open()?;
/// port.write_line("ping")?;
/// assert_eq!(port.read_line()?, "ping");
/// assert_eq!(driver.write_log(), vec![b"ping\n".to_vec()]);
/// # Ok::<(), serial_line::PortError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LoopbackDriver {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackDriver {
    /// Create a driver that loops written bytes back to the reader.
    pub fn new() -> Self {
        Self::with_loopback(true)
    }

    /// Create a driver, choosing whether writes are looped back.
    pub fn with_loopback(loopback: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopbackState {
                loopback,
                ..Default::default()
            })),
        }
    }

    /// Queue bytes as if the peer had sent them.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().rx.extend(data);
    }

    /// Limit how many bytes one driver read may return.
    pub fn set_read_chunk(&self, max: Option<usize>) {
        self.state.lock().read_chunk = max;
    }

    /// Limit how many bytes one driver write may accept.
    pub fn set_write_chunk(&self, max: Option<usize>) {
        self.state.lock().write_chunk = max;
    }

    /// Make the next call of the given primitive fail.
    pub fn inject_fault(&self, fault: Fault) {
        self.inject_fault_after(fault, 0);
    }

    /// Let `calls` calls of the primitive succeed, then fail the next one.
    pub fn inject_fault_after(&self, fault: Fault, calls: usize) {
        self.state.lock().faults.push((fault, calls));
    }

    /// All successful writes, one entry per driver call.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All written bytes joined together.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Bytes still waiting in the receive queue.
    pub fn pending(&self) -> usize {
        self.state.lock().rx.len()
    }

    pub fn acquire_calls(&self) -> usize {
        self.state.lock().acquire_calls
    }

    pub fn configure_calls(&self) -> usize {
        self.state.lock().configure_calls
    }

    pub fn read_calls(&self) -> usize {
        self.state.lock().read_calls
    }

    pub fn release_calls(&self) -> usize {
        self.state.lock().release_calls
    }

    /// Handles acquired and not yet released.
    pub fn live_handles(&self) -> usize {
        self.state.lock().live_handles
    }

    /// Path passed to the most recent acquire.
    pub fn last_path(&self) -> Option<String> {
        self.state.lock().last_path.clone()
    }

    /// Speed applied by the most recent configure.
    pub fn configured_baud(&self) -> Option<BaudRate> {
        self.state.lock().last_settings.map(|s| s.baud_rate)
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialDriver for LoopbackDriver {
    type Handle = LoopbackHandle;

    fn acquire(&mut self, path: &str) -> io::Result<LoopbackHandle> {
        let mut state = self.state.lock();
        state.acquire_calls += 1;
        state.last_path = Some(path.to_string());
        state.take_fault(Fault::Acquire)?;
        state.live_handles += 1;
        Ok(LoopbackHandle {
            id: state.acquire_calls as u64,
        })
    }

    fn configure(&mut self, _handle: &mut LoopbackHandle, settings: &LineSettings) -> io::Result<()> {
        let mut state = self.state.lock();
        state.configure_calls += 1;
        state.take_fault(Fault::Configure)?;
        state.last_settings = Some(*settings);
        Ok(())
    }

    fn read(&mut self, _handle: &mut LoopbackHandle, buffer: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.read_calls += 1;
        state.take_fault(Fault::Read)?;

        let limit = state.read_chunk.unwrap_or(usize::MAX).min(buffer.len());
        let n = limit.min(state.rx.len());
        for (slot, byte) in buffer.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, _handle: &mut LoopbackHandle, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Write)?;

        let n = state.write_chunk.unwrap_or(usize::MAX).min(data.len());
        let accepted = &data[..n];
        if n > 0 {
            state.write_log.push(accepted.to_vec());
        }
        if state.loopback {
            state.rx.extend(accepted);
        }
        Ok(n)
    }

    fn release(&mut self, _handle: LoopbackHandle) -> io::Result<()> {
        let mut state = self.state.lock();
        state.release_calls += 1;
        // The handle is gone whether or not the release reports an error.
        state.live_handles -= 1;
        state.take_fault(Fault::Release)
    }
}
