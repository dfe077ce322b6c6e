//! Transport layer for byte-level I/O with the robot controller
//!
//! The client never touches a serial port directly. It asks a [`Connector`]
//! for candidate ports and opens them into [`Transport`] handles, which keeps
//! the protocol code testable against the in-memory mock.

use crate::error::Result;
use std::time::Duration;

#[cfg(feature = "mock")]
pub mod mock;
mod serial;

pub use serial::{SerialConnector, SerialTransport};

/// Timeouts applied to an opened port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    /// Upper bound for a single `read_byte`
    pub read_timeout: Duration,
    /// Upper bound for a single `write_bytes`
    pub write_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
        }
    }
}

/// Byte stream to the robot controller
///
/// Every blocking operation is bounded: reads by the timeout passed in,
/// writes by the write timeout the handle was opened with. A timeout is
/// reported as [`Error::Timeout`](crate::Error::Timeout), never as `Ok`.
pub trait Transport: Send {
    /// Read exactly one byte, waiting at most `timeout`
    fn read_byte(&mut self, timeout: Duration) -> Result<u8>;

    /// Write all bytes as one unit
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Discard anything received but not yet read
    fn clear_input(&mut self) -> Result<()>;

    /// Discard anything queued but not yet transmitted
    fn clear_output(&mut self) -> Result<()>;

    /// Second handle onto the same port (reader/writer split)
    fn try_clone(&self) -> Result<Box<dyn Transport>>;

    /// Release the handle. Idempotent; later calls on this handle fail.
    fn close(&mut self);
}

/// Enumerates and opens ports
pub trait Connector: Send + Sync {
    /// Locally visible serial devices, in the order they should be tried
    fn discover_ports(&self) -> Result<Vec<String>>;

    /// Open `port` at `baud` with the given timeouts
    fn open(&self, port: &str, baud: u32, settings: &PortSettings) -> Result<Box<dyn Transport>>;
}
