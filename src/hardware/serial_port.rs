//! Serial bulb cable transport over the `serialport` crate.

use crate::error::ShutterError;
use crate::exposure::{LineOpener, RtsLine};
use serialport::SerialPort;
use std::time::Duration;
use tracing::debug;

/// Opens serial ports for RTS keying.
///
/// The baud rate is irrelevant to the cable, no data is ever sent; it is only needed to
/// open the port.
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    baud_rate: u32,
    timeout: Duration,
}

impl Default for SerialPortOpener {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_millis(100),
        }
    }
}

impl SerialPortOpener {
    /// Set the baud rate used to open the port.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

impl LineOpener for SerialPortOpener {
    fn open(&self, port: &str) -> Result<Box<dyn RtsLine>, ShutterError> {
        let handle = serialport::new(port, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| ShutterError::PortOpen {
                port: port.to_string(),
                reason: e.to_string(),
            })?;
        debug!(port, "Serial shutter port opened");
        Ok(Box::new(SerialRts { handle }))
    }
}

/// An open serial port; closed when dropped.
struct SerialRts {
    handle: Box<dyn SerialPort>,
}

impl RtsLine for SerialRts {
    fn set_rts(&mut self, level: bool) -> Result<(), ShutterError> {
        self.handle
            .write_request_to_send(level)
            .map_err(|e| ShutterError::Device(format!("failed to set RTS: {e}")))
    }
}
