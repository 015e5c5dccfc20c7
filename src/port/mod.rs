//! Serial port abstraction.
//!
//! [`Port`] owns a device handle obtained through a [`SerialDriver`], buffers
//! incoming bytes, and frames them into bytes or lines. [`NativeDriver`] talks
//! to real hardware; [`LoopbackDriver`] runs entirely in memory for tests.

pub mod baud;
pub mod buffer;
pub mod driver;
pub mod error;
mod framing;
pub mod mock;
pub mod native;
pub mod serial;

pub use baud::{BaudRate, UnsupportedBaudRate};
pub use buffer::DEFAULT_CHUNK_SIZE;
pub use driver::{LineSettings, SerialDriver};
pub use error::{CloseError, OpenError, PortError, ReadError, WriteError};
pub use mock::{Fault, LoopbackDriver, LoopbackHandle};
pub use native::{list_ports, NativeDriver, NativeHandle};
pub use serial::{Port, DEFAULT_TIMEOUT};
