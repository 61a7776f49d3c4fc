//! Serial bulb cable keyed by the RTS control line.
//!
//! No data bytes are exchanged: asserting RTS closes the release circuit (shutter
//! open), clearing it ends the exposure. The port is only held open while the shutter
//! is open.

use super::{ShutterKind, ShutterStrategy};
use crate::error::ShutterError;
use std::fmt;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// The RTS control line of an opened serial port.
pub trait RtsLine: Send {
    /// Drive RTS high (`true`) or low (`false`).
    fn set_rts(&mut self, level: bool) -> Result<(), ShutterError>;
}

/// Opens serial ports for RTS keying.
pub trait LineOpener: Send {
    /// Open `port` without blocking on modem control lines.
    fn open(&self, port: &str) -> Result<Box<dyn RtsLine>, ShutterError>;
}

/// Shutter strategy for an RTS-keyed serial cable.
pub struct SerialToggle {
    port: String,
    opener: Box<dyn LineOpener>,
    mirror_pulse: Duration,
    line: Option<Box<dyn RtsLine>>,
}

impl fmt::Debug for SerialToggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialToggle")
            .field("port", &self.port)
            .field("mirror_pulse", &self.mirror_pulse)
            .field("open", &self.line.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialToggle {
    /// Strategy for the cable on `port`.
    pub fn new(port: impl Into<String>, opener: Box<dyn LineOpener>, mirror_pulse: Duration) -> Self {
        Self {
            port: port.into(),
            opener,
            mirror_pulse,
            line: None,
        }
    }

    /// Configured port path.
    pub fn port(&self) -> &str {
        &self.port
    }
}

impl ShutterStrategy for SerialToggle {
    fn kind(&self) -> ShutterKind {
        ShutterKind::SerialToggle
    }

    fn start(&mut self) -> Result<(), ShutterError> {
        let mut line = self.opener.open(&self.port)?;
        line.set_rts(true)?;
        debug!(port = %self.port, "RTS asserted, shutter open");
        self.line = Some(line);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ShutterError> {
        // Dropping the line closes the port even if clearing RTS failed.
        if let Some(mut line) = self.line.take() {
            line.set_rts(false)?;
            debug!(port = %self.port, "RTS cleared, shutter closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.line.is_some()
    }

    fn supports_mirror_lock(&self) -> bool {
        true
    }

    fn mirror_lock(&mut self, delay: Duration) -> Result<(), ShutterError> {
        info!(port = %self.port, delay_ms = delay.as_millis() as u64, "Locking mirror");
        {
            let mut line = self.opener.open(&self.port)?;
            line.set_rts(true)?;
            thread::sleep(self.mirror_pulse);
            line.set_rts(false)?;
        }
        thread::sleep(delay.saturating_sub(self.mirror_pulse));
        Ok(())
    }
}
