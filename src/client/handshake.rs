//! SYNC0/SYNC1/SYNC2 handshake
//!
//! The server sits in an unknown state when a port is opened. Each phase
//! sends a one-byte packet and expects the same byte echoed back as the
//! reply's discriminant. One retry budget is shared across all three phases.
//! A corrupted reply drains both buffers before the next try, since the
//! stream can no longer be trusted.
//!
//! The SYNC2 reply carries the robot's name, class and subclass as
//! null-terminated strings after the discriminant.

use crate::error::{Error, Result};
use crate::protocol::constants::{SYNC0, SYNC1, SYNC2};
use crate::protocol::{encode_packet, read_packet};
use crate::transport::Transport;
use std::fmt;
use std::time::Duration;

const PHASES: [u8; 3] = [SYNC0, SYNC1, SYNC2];

/// Run the handshake on an opened port
///
/// Gives up with `Error::Timeout` once `retries + 1` exchanges have failed,
/// counting timeouts, corrupt replies and wrong echoes alike. Transport
/// I/O failures are returned immediately. On success returns the raw
/// identification bytes that followed the SYNC2 echo.
pub fn synchronize(
    transport: &mut dyn Transport,
    retries: u32,
    reply_timeout: Duration,
) -> Result<Vec<u8>> {
    let mut phase = 0;
    let mut failures = 0u32;

    loop {
        if failures > retries {
            log::warn!(
                "Sync gave up in phase SYNC{} after {} failed exchanges",
                PHASES[phase],
                failures
            );
            return Err(Error::Timeout);
        }

        let expected = PHASES[phase];
        transport.write_bytes(&encode_packet(&[expected])?)?;

        match read_packet(&mut *transport, reply_timeout) {
            Ok(packet) if packet.discriminant() == Some(expected) => {
                log::debug!("SYNC{} acknowledged", expected);
                if expected == SYNC2 {
                    return Ok(packet.payload()[1..].to_vec());
                }
                phase += 1;
            }
            Ok(packet) => {
                failures += 1;
                log::debug!(
                    "SYNC{} answered with {:02X?}, retrying",
                    expected,
                    packet.discriminant()
                );
            }
            Err(Error::Timeout) => {
                failures += 1;
                log::debug!("SYNC{} timed out", expected);
            }
            Err(Error::InvalidPacket(reason)) => {
                failures += 1;
                log::warn!("SYNC{} reply corrupt ({}), flushing buffers", expected, reason);
                transport.clear_input()?;
                transport.clear_output()?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Who answered the handshake, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub port: String,
    pub baud: u32,
    /// Bytes that followed the SYNC2 echo
    pub raw: Vec<u8>,
}

impl PeerIdentity {
    pub fn new(port: impl Into<String>, baud: u32, raw: Vec<u8>) -> Self {
        Self {
            port: port.into(),
            baud,
            raw,
        }
    }

    /// The null-terminated strings of the identification trailer
    pub fn fields(&self) -> Vec<String> {
        if self.raw.is_empty() {
            return Vec::new();
        }
        let mut fields: Vec<String> = self
            .raw
            .split(|&b| b == 0)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();
        // A terminated trailer leaves one empty piece after the last NUL
        if self.raw.last() == Some(&0) {
            fields.pop();
        }
        fields
    }

    pub fn name(&self) -> Option<String> {
        self.fields().into_iter().next()
    }

    pub fn class(&self) -> Option<String> {
        self.fields().into_iter().nth(1)
    }

    pub fn subclass(&self) -> Option<String> {
        self.fields().into_iter().nth(2)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields();
        if fields.is_empty() {
            write!(f, "unidentified robot")?;
        } else {
            write!(f, "{}", fields.join(" "))?;
        }
        write!(f, " on {} @ {} baud", self.port, self.baud)
    }
}
