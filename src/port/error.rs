//! Port-specific error types.
//!
//! Each lifecycle and I/O operation has its own error enum so callers can
//! match on exactly the failures that operation can produce. [`PortError`]
//! collects them for code that just wants to bubble errors up with `?`.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`Port::open`](super::Port::open).
#[derive(Debug, Error)]
pub enum OpenError {
    /// The device path could not be acquired (missing, busy, or permission denied).
    #[error("serial device {path} is unavailable: {source}")]
    DeviceUnavailable {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The requested baud rate is not in the supported set. No driver call was made.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// The device was acquired but rejected the line settings.
    #[error("failed to configure serial device {path}: {source}")]
    ConfigurationFailed {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Errors returned by [`Port::close`](super::Port::close).
#[derive(Debug, Error)]
pub enum CloseError {
    /// The driver reported an error while releasing the handle.
    #[error("failed to release serial device {path}: {source}")]
    ReleaseFailed {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Errors returned by the read side of a port.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The port is closed.
    #[error("port is not open")]
    NotOpen,

    /// The driver read call failed.
    #[error("read failed: {0}")]
    IoFailure(#[source] io::Error),

    /// No data arrived before the configured timeout elapsed.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors returned by the write side of a port.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The port is closed.
    #[error("port is not open")]
    NotOpen,

    /// A driver write call failed or stalled before all bytes were written.
    #[error("write failed after {written} of {total} bytes: {source}")]
    IoFailure {
        written: usize,
        total: usize,
        #[source]
        source: io::Error,
    },
}

/// Any error a port operation can produce.
#[derive(Debug, Error)]
pub enum PortError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Close(#[from] CloseError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl ReadError {
    /// Whether this error only means "no data yet".
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadError::Timeout(_))
    }
}
