//! The seam between a [`Port`](super::Port) and the operating system.
//!
//! A [`SerialDriver`] exposes the five primitives a port needs: acquire a
//! device, configure its line, read, write and release. The handle type is
//! chosen by each driver, so the rest of the crate never branches on the
//! platform.

use super::baud::BaudRate;
use std::io;

/// Line settings applied when a port is opened.
///
/// Only the speed varies. Every driver must also put the line into raw mode
/// with 8 data bits, no parity, one stop bit, no flow control, no echo and
/// modem control lines ignored, so the port behaves as a plain byte pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    /// Line speed.
    pub baud_rate: BaudRate,
}

impl LineSettings {
    /// Raw 8N1 settings at the given speed.
    pub fn raw_8n1(baud_rate: BaudRate) -> Self {
        Self { baud_rate }
    }
}

/// Trait for the OS-level serial primitives.
///
/// Implementations are used by exactly one port at a time and are always
/// called with the port's lock held, so they need `Send` but not `Sync`.
pub trait SerialDriver: Send {
    /// An open device. Only valid between `acquire` and `release`.
    type Handle: Send;

    /// Open the device at `path`.
    fn acquire(&mut self, path: &str) -> io::Result<Self::Handle>;

    /// Apply line settings to a freshly acquired handle.
    fn configure(&mut self, handle: &mut Self::Handle, settings: &LineSettings) -> io::Result<()>;

    /// Read up to `buffer.len()` bytes.
    ///
    /// Returns `Ok(0)` when no data is currently available. Errors are reserved
    /// for real failures of the device.
    fn read(&mut self, handle: &mut Self::Handle, buffer: &mut [u8]) -> io::Result<usize>;

    /// Write some prefix of `data`, returning how many bytes were accepted.
    fn write(&mut self, handle: &mut Self::Handle, data: &[u8]) -> io::Result<usize>;

    /// Close the device, consuming the handle.
    fn release(&mut self, handle: Self::Handle) -> io::Result<()>;
}
