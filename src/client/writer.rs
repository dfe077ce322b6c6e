//! Serialized write access to the link
//!
//! Every outbound frame (caller commands, heartbeat PULSEs, teardown) goes
//! through one `LinkWriter`. The mutex is held for the whole frame, so
//! frames from different threads never interleave on the wire.

use crate::error::{Error, Result};
use crate::protocol::Command;
use crate::transport::Transport;
use parking_lot::Mutex;

pub struct LinkWriter {
    port: Mutex<Option<Box<dyn Transport>>>,
}

impl LinkWriter {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            port: Mutex::new(Some(transport)),
        }
    }

    /// Encode and send one command as a single frame
    pub fn send(&self, command: &Command) -> Result<()> {
        let frame = command.encode()?;
        self.write_frame(&frame)?;
        log::trace!("Sent {:?} ({} bytes)", command, frame.len());
        Ok(())
    }

    /// Write an already-framed packet
    pub fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut port = self.port.lock();
        let Some(port) = port.as_mut() else {
            return Err(Error::usage("not connected"));
        };
        port.write_bytes(frame)
    }

    pub fn is_closed(&self) -> bool {
        self.port.lock().is_none()
    }

    /// Close the port. Later writes fail with a usage error.
    pub fn close(&self) {
        if let Some(mut port) = self.port.lock().take() {
            port.close();
        }
    }
}
