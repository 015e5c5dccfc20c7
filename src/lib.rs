//! Serial Line Library
//!
//! A small serial (UART) port abstraction: open and close a named device,
//! write raw bytes or newline-terminated lines, and read bytes or lines back
//! through an internal buffer.
//!
//! # Modules
//!
//! - `port`: the [`Port`] type, its drivers, buffering and framing
//! - `config`: TOML configuration with environment overrides
//! - `logging`: `tracing` subscriber setup for applications
//!
//! # Example
//!
//! ```
//! use serial_line::{LoopbackDriver, Port};
//!
//! let port = Port::with_driver(LoopbackDriver::new(), "LOOP", 115200);
//! port.open()?;
//! port.write_line("Hello World.")?;
//! assert_eq!(port.read_line()?, "Hello World.");
//! port.close()?;
//! assert!(!port.is_open());
//! # Ok::<(), serial_line::PortError>(())
//! ```

pub mod config;
pub mod logging;
pub mod port;

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use port::{
    BaudRate, CloseError, LoopbackDriver, NativeDriver, OpenError, Port, PortError, ReadError,
    SerialDriver, WriteError,
};
