//! Mock transport for testing
//!
//! All handles cloned from one `MockTransport` share the same simulated port:
//! bytes injected (or produced by the responder) are read by whichever handle
//! reads first, and every write lands in one shared capture.

use super::{Connector, PortSettings, Transport};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Scripted peer: sees each complete write, returns bytes to queue for reading
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Mock transport for unit testing
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
    closed: bool,
}

struct Shared {
    inner: Mutex<MockTransportInner>,
    readable: Condvar,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    /// Byte stream as the far end would see it
    stream: Vec<u8>,
    /// One entry per `write_bytes` call
    writes: Vec<Vec<u8>>,
    responder: Option<Responder>,
    input_clears: usize,
    output_clears: usize,
    read_timeouts: usize,
    write_timeouts: bool,
}

fn closed_error() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::NotConnected, "mock port closed"))
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            shared: Arc::new(Shared {
                inner: Mutex::new(MockTransportInner::default()),
                readable: Condvar::new(),
            }),
            closed: false,
        }
    }

    /// Create a mock whose peer answers every write through `responder`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        let mock = Self::new();
        mock.set_responder(responder);
        mock
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        self.shared.inner.lock().responder = Some(Box::new(responder));
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        let mut inner = self.shared.inner.lock();
        inner.read_buffer.extend(data);
        self.shared.readable.notify_all();
    }

    /// Everything written so far, as one byte stream
    pub fn get_written(&self) -> Vec<u8> {
        self.shared.inner.lock().stream.clone()
    }

    /// Everything written so far, one entry per write call
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.inner.lock().writes.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        let mut inner = self.shared.inner.lock();
        inner.stream.clear();
        inner.writes.clear();
    }

    /// Bytes queued but not yet read
    pub fn pending_read(&self) -> usize {
        self.shared.inner.lock().read_buffer.len()
    }

    /// Number of `clear_input` calls on any handle
    pub fn input_clears(&self) -> usize {
        self.shared.inner.lock().input_clears
    }

    /// Number of `clear_output` calls on any handle
    pub fn output_clears(&self) -> usize {
        self.shared.inner.lock().output_clears
    }

    /// Number of `read_byte` calls that timed out
    pub fn read_timeouts(&self) -> usize {
        self.shared.inner.lock().read_timeouts
    }

    /// Make every write report a timeout (nothing is captured)
    pub fn fail_writes_with_timeout(&self, fail: bool) {
        self.shared.inner.lock().write_timeouts = fail;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        if self.closed {
            return Err(closed_error());
        }
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(byte) = inner.read_buffer.pop_front() {
                return Ok(byte);
            }
            if self
                .shared
                .readable
                .wait_until(&mut inner, deadline)
                .timed_out()
                && inner.read_buffer.is_empty()
            {
                inner.read_timeouts += 1;
                return Err(Error::Timeout);
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        if self.shared.inner.lock().write_timeouts {
            return Err(Error::Timeout);
        }
        // One byte at a time with a yield in between, so unsynchronized
        // writers would visibly interleave in the captured stream
        for &b in bytes {
            self.shared.inner.lock().stream.push(b);
            thread::yield_now();
        }
        let mut inner = self.shared.inner.lock();
        inner.writes.push(bytes.to_vec());
        let reply = match inner.responder.as_mut() {
            Some(responder) => responder(bytes),
            None => Vec::new(),
        };
        if !reply.is_empty() {
            inner.read_buffer.extend(reply);
            self.shared.readable.notify_all();
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        let mut inner = self.shared.inner.lock();
        inner.read_buffer.clear();
        inner.input_clears += 1;
        Ok(())
    }

    fn clear_output(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        self.shared.inner.lock().output_clears += 1;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>> {
        if self.closed {
            return Err(closed_error());
        }
        Ok(Box::new(self.clone()))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Connector handing out handles onto one `MockTransport`
#[derive(Clone)]
pub struct MockConnector {
    ports: Vec<String>,
    transport: MockTransport,
    responsive_baud: Option<u32>,
    failing_ports: Vec<String>,
    opened: Arc<Mutex<Vec<(String, u32)>>>,
}

impl MockConnector {
    /// Every listed port opens onto `transport`
    pub fn new(ports: &[&str], transport: MockTransport) -> Self {
        Self {
            ports: ports.iter().map(|p| p.to_string()).collect(),
            transport,
            responsive_baud: None,
            failing_ports: Vec::new(),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Only `baud` reaches the scripted peer; other rates get a silent line
    pub fn responsive_at(mut self, baud: u32) -> Self {
        self.responsive_baud = Some(baud);
        self
    }

    /// Opening `port` fails as if permission were denied
    pub fn failing_port(mut self, port: &str) -> Self {
        self.failing_ports.push(port.to_string());
        self
    }

    /// Every `(port, baud)` passed to `open`, in order
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened.lock().clone()
    }
}

impl Connector for MockConnector {
    fn discover_ports(&self) -> Result<Vec<String>> {
        Ok(self.ports.clone())
    }

    fn open(&self, port: &str, baud: u32, _settings: &PortSettings) -> Result<Box<dyn Transport>> {
        self.opened.lock().push((port.to_string(), baud));
        if self.failing_ports.iter().any(|p| p == port) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot open {}", port),
            )));
        }
        match self.responsive_baud {
            Some(expected) if expected != baud => Ok(Box::new(MockTransport::new())),
            _ => Ok(Box::new(self.transport.clone())),
        }
    }
}
