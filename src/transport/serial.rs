//! Serial transport implementation

use super::{Connector, PortSettings, Transport};
use crate::error::{Error, Result};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Serial transport for the robot's host UART
pub struct SerialTransport {
    /// `None` once closed
    port: Option<Box<dyn SerialPort>>,
    /// Timeout currently programmed into the port
    current_timeout: Duration,
    write_timeout: Duration,
}

impl SerialTransport {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Baud rate (e.g., 115200)
    /// * `settings` - Read/write timeouts
    pub fn open(path: &str, baud_rate: u32, settings: &PortSettings) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()?;

        log::debug!("Opened serial port: {} at {} baud", path, baud_rate);

        Ok(SerialTransport {
            port: Some(port),
            current_timeout: settings.read_timeout,
            write_timeout: settings.write_timeout,
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "serial port closed",
            ))
        })
    }

    fn ensure_timeout(&mut self, timeout: Duration) -> Result<()> {
        if self.current_timeout != timeout {
            self.port()?.set_timeout(timeout)?;
            self.current_timeout = timeout;
        }
        Ok(())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

impl Transport for SerialTransport {
    fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        self.ensure_timeout(timeout)?;
        let mut byte = [0u8; 1];
        match self.port()?.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            Ok(_) => Err(Error::Timeout),
            Err(e) if is_timeout(&e) => Err(Error::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let write_timeout = self.write_timeout;
        self.ensure_timeout(write_timeout)?;
        let port = self.port()?;
        let written = match port.write_all(bytes) {
            Ok(()) => port.flush(),
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => Ok(()),
            Err(e) if is_timeout(&e) => Err(Error::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn clear_output(&mut self) -> Result<()> {
        self.port()?.clear(ClearBuffer::Output)?;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>> {
        let port = self.port.as_ref().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "serial port closed",
            ))
        })?;
        Ok(Box::new(SerialTransport {
            port: Some(port.try_clone()?),
            current_timeout: self.current_timeout,
            write_timeout: self.write_timeout,
        }))
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            log::debug!(
                "Closing serial port {}",
                port.name().unwrap_or_else(|| "<unnamed>".to_string())
            );
        }
    }
}

/// Connector backed by the host's serial devices
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn discover_ports(&self) -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, port: &str, baud: u32, settings: &PortSettings) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SerialTransport::open(port, baud, settings)?))
    }
}
