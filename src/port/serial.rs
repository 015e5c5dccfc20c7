//! The [`Port`]: a serial device with an open/closed lifecycle, a buffered
//! read side and a strict write side.
//!
//! All state lives behind one lock, so a port can be shared between threads
//! through an `Arc`. Each public call holds the lock for its whole duration,
//! which keeps a written line or a read line from interleaving with another
//! thread's.

use super::baud::BaudRate;
use super::buffer::{ReadBuffer, DEFAULT_CHUNK_SIZE};
use super::driver::{LineSettings, SerialDriver};
use super::error::{CloseError, OpenError, ReadError, WriteError};
use super::framing::Reader;
use super::native::NativeDriver;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Read timeout a port starts with.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Driver read primitive bound to an open handle.
type DriverRead<'a> = &'a mut dyn FnMut(&mut [u8]) -> io::Result<usize>;

struct Inner<D: SerialDriver> {
    driver: D,
    /// Present only while the port is open.
    handle: Option<D::Handle>,
    buffer: ReadBuffer,
    timeout: Option<Duration>,
}

/// A serial port.
///
/// Constructed closed. [`open`](Self::open) acquires and configures the
/// device; [`close`](Self::close), or dropping the port, releases it.
///
/// # Example
/// ```no_run
/// use serial_line::port::Port;
///
/// let port = Port::new("/dev/ttyUSB0", 115200);
/// port.open()?;
/// port.write_line("AT")?;
/// println!("{}", port.read_line()?);
/// port.close()?;
/// # Ok::<(), serial_line::PortError>(())
/// ```
pub struct Port<D: SerialDriver = NativeDriver> {
    path: String,
    baud_rate: u32,
    inner: Mutex<Inner<D>>,
}

impl Port<NativeDriver> {
    /// A closed port for the device at `path`, using the native driver.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_driver(NativeDriver::new(), path, baud_rate)
    }
}

impl<D: SerialDriver> Port<D> {
    /// A closed port that talks to its device through `driver`.
    ///
    /// The baud rate is checked when the port is opened, not here.
    pub fn with_driver(driver: D, path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            inner: Mutex::new(Inner {
                driver,
                handle: None,
                buffer: ReadBuffer::new(DEFAULT_CHUNK_SIZE),
                timeout: Some(DEFAULT_TIMEOUT),
            }),
        }
    }

    /// Set the read timeout. `None` makes reads return as soon as the driver
    /// has nothing to deliver.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inner.get_mut().timeout = timeout;
        self
    }

    /// Set how many bytes are requested from the driver per refill.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.inner.get_mut().buffer.set_chunk_size(chunk_size);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The baud rate this port was constructed with, supported or not.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.lock().timeout
    }

    pub fn chunk_size(&self) -> usize {
        self.inner.lock().buffer.chunk_size()
    }

    /// Change the read timeout. Takes effect on the next read.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.inner.lock().timeout = timeout;
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().handle.is_some()
    }

    /// Acquire the device and configure the line.
    ///
    /// Either the port ends up open and fully configured, or it stays closed
    /// with nothing held. Opening an open port does nothing.
    pub fn open(&self) -> Result<(), OpenError> {
        let mut inner = self.inner.lock();
        if inner.handle.is_some() {
            return Ok(());
        }

        let baud_rate = BaudRate::try_from(self.baud_rate)
            .map_err(|e| OpenError::UnsupportedBaudRate(e.0))?;

        let mut handle =
            inner
                .driver
                .acquire(&self.path)
                .map_err(|source| OpenError::DeviceUnavailable {
                    path: self.path.clone(),
                    source,
                })?;

        if let Err(source) = inner
            .driver
            .configure(&mut handle, &LineSettings::raw_8n1(baud_rate))
        {
            if let Err(e) = inner.driver.release(handle) {
                warn!("Failed to release {} after configuration error: {}", self.path, e);
            }
            return Err(OpenError::ConfigurationFailed {
                path: self.path.clone(),
                source,
            });
        }

        inner.buffer.clear();
        inner.handle = Some(handle);
        debug!("Opened {} at {} baud", self.path, baud_rate);
        Ok(())
    }

    /// Release the device. Closing a closed port does nothing.
    ///
    /// Unread buffered bytes are discarded. The port counts as closed even if
    /// the driver reports a release error.
    pub fn close(&self) -> Result<(), CloseError> {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.handle.take() else {
            return Ok(());
        };
        inner.buffer.clear();

        inner
            .driver
            .release(handle)
            .map_err(|source| CloseError::ReleaseFailed {
                path: self.path.clone(),
                source,
            })?;
        debug!("Closed {}", self.path);
        Ok(())
    }

    /// Write every byte of `data`, or report how far the write got.
    pub fn write_bytes(&self, data: &[u8]) -> Result<(), WriteError> {
        let mut guard = self.inner.lock();
        let Inner { driver, handle, .. } = &mut *guard;
        let handle = handle.as_mut().ok_or(WriteError::NotOpen)?;
        write_all(driver, handle, data)
    }

    /// Write `text` followed by a single `\n`.
    pub fn write_line(&self, text: &str) -> Result<(), WriteError> {
        let mut framed = Vec::with_capacity(text.len() + 1);
        framed.extend_from_slice(text.as_bytes());
        framed.push(b'\n');
        self.write_bytes(&framed)
    }

    /// The next byte.
    ///
    /// Without a timeout, returns `Ok(None)` when nothing is available right
    /// now. With one, waits up to the timeout and then returns
    /// [`ReadError::Timeout`].
    pub fn read_byte(&self) -> Result<Option<u8>, ReadError> {
        self.read_with(|reader| reader.next_byte())
    }

    /// Up to `max` bytes; fewer when the data runs out.
    pub fn read_bytes(&self, max: usize) -> Result<Vec<u8>, ReadError> {
        self.read_with(|reader| reader.read_bytes(max))
    }

    /// The next line as raw bytes, without its `\n` or `\r\n` terminator.
    ///
    /// If the data runs out before a terminator, the partial line is returned
    /// as received.
    pub fn read_line_bytes(&self) -> Result<Vec<u8>, ReadError> {
        self.read_with(|reader| reader.read_line())
    }

    /// Like [`read_line_bytes`](Self::read_line_bytes), decoded as UTF-8.
    /// Invalid sequences are replaced with U+FFFD.
    pub fn read_line(&self) -> Result<String, ReadError> {
        self.read_line_bytes().map(decode_lossy)
    }

    /// The next complete line, or `None` if no terminator has arrived yet.
    ///
    /// Unlike [`read_line`](Self::read_line), a partial line is kept in the
    /// buffer and returned whole once its `\n` arrives.
    pub fn try_read_line(&self) -> Result<Option<String>, ReadError> {
        let line = self.read_with(|reader| reader.read_complete_line())?;
        Ok(line.map(decode_lossy))
    }

    /// Refill once, then report how many bytes are buffered.
    ///
    /// More bytes may arrive right after this returns.
    pub fn available(&self) -> Result<usize, ReadError> {
        self.read_with(|reader| reader.available())
    }

    fn read_with<T>(
        &self,
        op: impl FnOnce(&mut Reader<'_, DriverRead<'_>>) -> Result<T, ReadError>,
    ) -> Result<T, ReadError> {
        let mut guard = self.inner.lock();
        let Inner {
            driver,
            handle,
            buffer,
            timeout,
        } = &mut *guard;
        let handle = handle.as_mut().ok_or(ReadError::NotOpen)?;
        let mut source = |chunk: &mut [u8]| driver.read(handle, chunk);
        let mut reader = Reader::new(buffer, &mut source as DriverRead<'_>, *timeout);
        op(&mut reader)
    }
}

fn decode_lossy(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn write_all<D: SerialDriver>(
    driver: &mut D,
    handle: &mut D::Handle,
    data: &[u8],
) -> Result<(), WriteError> {
    let total = data.len();
    let mut written = 0;
    while written < total {
        match driver.write(handle, &data[written..]) {
            Ok(0) => {
                return Err(WriteError::IoFailure {
                    written,
                    total,
                    source: io::ErrorKind::WriteZero.into(),
                })
            }
            Ok(n) => written += n.min(total - written),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => {
                return Err(WriteError::IoFailure {
                    written,
                    total,
                    source,
                })
            }
        }
    }
    trace!("Wrote {} bytes", total);
    Ok(())
}

impl<D: SerialDriver> Drop for Port<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{}", e);
        }
    }
}

impl<D: SerialDriver> fmt::Debug for Port<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{Fault, LoopbackDriver};
    use mockall::{mock, predicate::eq};

    mock! {
        Driver {}
        impl SerialDriver for Driver {
            type Handle = u32;
            fn acquire(&mut self, path: &str) -> io::Result<u32>;
            fn configure(&mut self, handle: &mut u32, settings: &LineSettings) -> io::Result<()>;
            fn read(&mut self, handle: &mut u32, buffer: &mut [u8]) -> io::Result<usize>;
            fn write(&mut self, handle: &mut u32, data: &[u8]) -> io::Result<usize>;
            fn release(&mut self, handle: u32) -> io::Result<()>;
        }
    }

    fn loopback(baud_rate: u32) -> (LoopbackDriver, Port<LoopbackDriver>) {
        let driver = LoopbackDriver::new();
        let port = Port::with_driver(driver.clone(), "LOOP", baud_rate).with_timeout(None);
        (driver, port)
    }

    #[test]
    fn test_defaults() {
        let (_, port) = loopback(115200);
        let port = port.with_timeout(Some(DEFAULT_TIMEOUT));
        assert_eq!(port.path(), "LOOP");
        assert_eq!(port.baud_rate(), 115200);
        assert_eq!(port.timeout(), Some(Duration::from_millis(1000)));
        assert_eq!(port.chunk_size(), 64);
        assert!(!port.is_open());
    }

    #[test]
    fn test_unsupported_baud_never_acquires() {
        let mut driver = MockDriver::new();
        driver.expect_acquire().never();

        let port = Port::with_driver(driver, "COM1", 1234);
        let err = port.open().unwrap_err();
        assert!(matches!(err, OpenError::UnsupportedBaudRate(1234)));
        assert!(!port.is_open());
    }

    #[test]
    fn test_configuration_failure_releases_handle() {
        let mut driver = MockDriver::new();
        driver.expect_acquire().times(1).returning(|_| Ok(7));
        driver
            .expect_configure()
            .times(1)
            .returning(|_, _| Err(io::Error::from(io::ErrorKind::InvalidInput)));
        driver
            .expect_release()
            .with(eq(7))
            .times(1)
            .returning(|_| Ok(()));

        let port = Port::with_driver(driver, "COM1", 9600);
        let err = port.open().unwrap_err();
        assert!(matches!(err, OpenError::ConfigurationFailed { .. }));
        assert!(!port.is_open());
    }

    #[test]
    fn test_configure_receives_validated_baud() {
        let mut driver = MockDriver::new();
        driver.expect_acquire().returning(|_| Ok(1));
        driver
            .expect_configure()
            .withf(|_, settings| settings.baud_rate == BaudRate::B38400)
            .times(1)
            .returning(|_, _| Ok(()));
        driver.expect_release().times(1).returning(|_| Ok(()));

        let port = Port::with_driver(driver, "COM1", 38400);
        port.open().unwrap();
        assert!(port.is_open());
    }

    #[test]
    fn test_release_failure_is_surfaced() {
        let mut driver = MockDriver::new();
        driver.expect_acquire().returning(|_| Ok(3));
        driver.expect_configure().returning(|_, _| Ok(()));
        driver
            .expect_release()
            .times(1)
            .returning(|_| Err(io::Error::other("device vanished")));

        let port = Port::with_driver(driver, "COM1", 9600);
        port.open().unwrap();
        let err = port.close().unwrap_err();
        assert!(matches!(err, CloseError::ReleaseFailed { .. }));
        assert!(!port.is_open());
        // Already closed: the drop must not release a second time.
    }

    #[test]
    fn test_device_unavailable() {
        let (driver, port) = loopback(9600);
        driver.inject_fault(Fault::Acquire);

        let err = port.open().unwrap_err();
        assert!(matches!(err, OpenError::DeviceUnavailable { ref path, .. } if path == "LOOP"));
        assert!(!port.is_open());
        assert_eq!(driver.live_handles(), 0);
    }

    #[test]
    fn test_open_twice_is_noop() {
        let (driver, port) = loopback(9600);
        port.open().unwrap();
        port.open().unwrap();
        assert_eq!(driver.acquire_calls(), 1);
        assert_eq!(driver.configured_baud(), Some(BaudRate::B9600));
    }

    #[test]
    fn test_closed_port_rejects_io() {
        let (driver, port) = loopback(9600);
        assert!(matches!(port.write_line("x"), Err(WriteError::NotOpen)));
        assert!(matches!(port.read_bytes(1), Err(ReadError::NotOpen)));
        assert!(matches!(port.read_line(), Err(ReadError::NotOpen)));
        assert!(matches!(port.available(), Err(ReadError::NotOpen)));
        assert!(matches!(port.read_byte(), Err(ReadError::NotOpen)));
        assert_eq!(driver.read_calls(), 0);
    }

    #[test]
    fn test_close_discards_buffered_bytes() {
        let (driver, port) = loopback(9600);
        port.open().unwrap();
        driver.enqueue_read(b"stale");
        assert_eq!(port.available().unwrap(), 5);

        port.close().unwrap();
        port.open().unwrap();
        assert_eq!(port.available().unwrap(), 0);
    }

    #[test]
    fn test_short_writes_are_completed() {
        let (driver, port) = loopback(9600);
        driver.set_write_chunk(Some(3));
        port.open().unwrap();

        port.write_bytes(b"abcdefgh").unwrap();
        assert_eq!(driver.write_log().len(), 3);
        assert_eq!(driver.written(), b"abcdefgh");
    }

    #[test]
    fn test_stalled_write_is_failure() {
        let (driver, port) = loopback(9600);
        driver.set_write_chunk(Some(0));
        port.open().unwrap();

        let err = port.write_bytes(b"abc").unwrap_err();
        assert!(matches!(err, WriteError::IoFailure { written: 0, total: 3, .. }));
    }

    #[test]
    fn test_write_error_is_failure() {
        let (driver, port) = loopback(9600);
        port.open().unwrap();
        driver.inject_fault(Fault::Write);

        assert!(matches!(port.write_line("x"), Err(WriteError::IoFailure { .. })));
    }

    #[test]
    fn test_write_failure_after_partial_progress() {
        let (driver, port) = loopback(9600);
        driver.set_write_chunk(Some(3));
        driver.inject_fault_after(Fault::Write, 1);
        port.open().unwrap();

        let err = port.write_bytes(b"abcdefgh").unwrap_err();

        assert!(matches!(err, WriteError::IoFailure { written: 3, total: 8, .. }));
        assert_eq!(driver.written(), b"abc");
    }

    #[test]
    fn test_try_read_line_waits_for_terminator() {
        let (driver, port) = loopback(9600);
        port.open().unwrap();
        driver.enqueue_read(b"caf\xc3");

        assert_eq!(port.try_read_line().unwrap(), None);
        driver.enqueue_read(b"\xa9\r\n");
        assert_eq!(port.try_read_line().unwrap().as_deref(), Some("café"));
        assert_eq!(port.try_read_line().unwrap(), None);
    }

    #[test]
    fn test_empty_write_touches_nothing() {
        let (driver, port) = loopback(9600);
        port.open().unwrap();
        port.write_bytes(&[]).unwrap();
        assert!(driver.write_log().is_empty());
    }

    #[test]
    fn test_read_line_lossy_utf8() {
        let (driver, port) = loopback(9600);
        port.open().unwrap();
        driver.enqueue_read(b"caf\xc3\xa9 \xff\n");
        assert_eq!(port.read_line().unwrap(), "café \u{fffd}");
    }

    #[test]
    fn test_drop_releases_handle() {
        let (driver, port) = loopback(9600);
        port.open().unwrap();
        assert_eq!(driver.live_handles(), 1);

        drop(port);
        assert_eq!(driver.live_handles(), 0);
        assert_eq!(driver.release_calls(), 1);
    }

    #[test]
    fn test_port_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Port<LoopbackDriver>>();
        assert_send_sync::<Port>();
    }
}
