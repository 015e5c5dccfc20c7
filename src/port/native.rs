//! Serial driver backed by the `serialport` crate.
//!
//! The handle is the platform's native port type, picked at compile time:
//! `TTYPort` on Unix and `COMPort` on Windows. Releasing goes through the raw
//! descriptor so that a failing close is reported instead of being lost in a
//! destructor.

use super::driver::{LineSettings, SerialDriver};
use serialport::SerialPort as _;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

/// Native port handle on Unix.
#[cfg(unix)]
pub type NativeHandle = serialport::TTYPort;

/// Native port handle on Windows.
#[cfg(windows)]
pub type NativeHandle = serialport::COMPort;

/// How long a single driver read may wait for the first byte.
///
/// Kept short so a read behaves like a non-blocking poll. Longer waits are
/// implemented by the port's own timeout loop.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Speed used while the device is being acquired, before `configure` runs.
const ACQUIRE_BAUD: u32 = 9600;

/// Driver talking to real serial hardware.
#[derive(Debug, Clone)]
pub struct NativeDriver {
    poll_timeout: Duration,
}

impl NativeDriver {
    /// Create a driver with the default poll timeout.
    pub fn new() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Create a driver whose individual reads wait up to `poll_timeout`.
    pub fn with_poll_timeout(poll_timeout: Duration) -> Self {
        Self { poll_timeout }
    }

    /// The per-read wait used by this driver.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }
}

impl Default for NativeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialDriver for NativeDriver {
    type Handle = NativeHandle;

    fn acquire(&mut self, path: &str) -> io::Result<NativeHandle> {
        // Opening through serialport already puts the line into raw mode and
        // sets CLOCAL, so modem control lines are ignored from the start.
        let handle = serialport::new(path, ACQUIRE_BAUD)
            .timeout(self.poll_timeout)
            .open_native()
            .map_err(io::Error::from)?;
        debug!("Acquired native handle for {}", path);
        Ok(handle)
    }

    fn configure(&mut self, handle: &mut NativeHandle, settings: &LineSettings) -> io::Result<()> {
        handle.set_baud_rate(settings.baud_rate.as_u32())?;
        handle.set_data_bits(serialport::DataBits::Eight)?;
        handle.set_parity(serialport::Parity::None)?;
        handle.set_stop_bits(serialport::StopBits::One)?;
        handle.set_flow_control(serialport::FlowControl::None)?;
        handle.set_timeout(self.poll_timeout)?;
        debug!("Configured line at {} baud, 8N1, no flow control", settings.baud_rate);
        Ok(())
    }

    fn read(&mut self, handle: &mut NativeHandle, buffer: &mut [u8]) -> io::Result<usize> {
        match handle.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if is_no_data(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, handle: &mut NativeHandle, data: &[u8]) -> io::Result<usize> {
        let n = handle.write(data)?;
        trace!("Native write accepted {} of {} bytes", n, data.len());
        Ok(n)
    }

    #[cfg(unix)]
    fn release(&mut self, mut handle: NativeHandle) -> io::Result<()> {
        use std::os::unix::io::IntoRawFd;

        // Dropping a TTYPort clears the exclusive flag for us; closing the raw
        // descriptor does not, so do it first.
        handle.set_exclusive(false).map_err(io::Error::from)?;
        let fd = handle.into_raw_fd();
        // SAFETY: `into_raw_fd` transferred ownership of `fd` to us and nothing
        // else refers to it.
        if unsafe { libc::close(fd) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(windows)]
    fn release(&mut self, handle: NativeHandle) -> io::Result<()> {
        use std::os::windows::io::IntoRawHandle;

        let raw = handle.into_raw_handle();
        // SAFETY: `into_raw_handle` transferred ownership of `raw` to us and
        // nothing else refers to it.
        if unsafe { winapi::um::handleapi::CloseHandle(raw as winapi::um::winnt::HANDLE) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// A poll that came back empty is not a device failure.
fn is_no_data(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Names of the serial devices currently present on this machine.
pub fn list_ports() -> io::Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(io::Error::from)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_is_not_found() {
        let mut driver = NativeDriver::new();
        let err = driver
            .acquire("/dev/nonexistent_port_12345")
            .expect_err("acquiring a missing device must fail");
        assert_ne!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_no_data_kinds() {
        assert!(is_no_data(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_no_data(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_no_data(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }

    #[test]
    fn test_default_poll_timeout() {
        assert_eq!(NativeDriver::default().poll_timeout(), DEFAULT_POLL_TIMEOUT);
        let driver = NativeDriver::with_poll_timeout(Duration::from_millis(20));
        assert_eq!(driver.poll_timeout(), Duration::from_millis(20));
    }
}
