//! USB shutter release (DSUSB protocol).
//!
//! The device takes single-byte commands. Bits:
//!
//! | Bit    | Meaning                 |
//! |--------|-------------------------|
//! | `0x01` | shutter                 |
//! | `0x02` | focus (half press)      |
//! | `0x10` | LED red (green if clear) |
//! | `0x20` | LED on                  |
//!
//! Many bodies ignore a shutter assertion that is not preceded by a focus half-press,
//! so opening and closing are both two-phase.

use super::{ShutterKind, ShutterStrategy};
use crate::error::ShutterError;
use std::fmt;
use std::ops::BitOr;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// One command byte for a USB release device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReleaseCommand(u8);

impl ReleaseCommand {
    /// All lines released, LED off.
    pub const NONE: Self = Self(0x00);
    /// Shutter line.
    pub const SHUTTER: Self = Self(0x01);
    /// Focus line.
    pub const FOCUS: Self = Self(0x02);
    /// Red LED color.
    pub const LED_RED: Self = Self(0x10);
    /// LED on.
    pub const LED_ON: Self = Self(0x20);

    /// Raw command byte.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ReleaseCommand {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ReleaseCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Transport for release commands.
pub trait ReleaseDevice: Send {
    /// Send one command byte to the device.
    fn send(&mut self, command: ReleaseCommand) -> Result<(), ShutterError>;
}

/// Shutter strategy driving a USB release device.
///
/// The device is opened when the camera is opened and held for the whole session.
/// Mirror lock is not available over this interface.
pub struct UsbRelease {
    device: Box<dyn ReleaseDevice>,
    phase_delay: Duration,
    open: bool,
}

impl fmt::Debug for UsbRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbRelease")
            .field("phase_delay", &self.phase_delay)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl UsbRelease {
    /// Wrap an opened device.
    pub fn new(device: Box<dyn ReleaseDevice>, phase_delay: Duration) -> Self {
        Self {
            device,
            phase_delay,
            open: false,
        }
    }

    fn send(&mut self, command: ReleaseCommand) -> Result<(), ShutterError> {
        debug!(command = %command, "USB release command");
        self.device.send(command)
    }
}

impl ShutterStrategy for UsbRelease {
    fn kind(&self) -> ShutterKind {
        ShutterKind::UsbRelease
    }

    fn start(&mut self) -> Result<(), ShutterError> {
        self.send(ReleaseCommand::FOCUS | ReleaseCommand::LED_ON)?;
        thread::sleep(self.phase_delay);
        self.send(ReleaseCommand::SHUTTER | ReleaseCommand::LED_ON)?;
        self.open = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ShutterError> {
        self.send(
            ReleaseCommand::SHUTTER
                | ReleaseCommand::FOCUS
                | ReleaseCommand::LED_ON
                | ReleaseCommand::LED_RED,
        )?;
        thread::sleep(self.phase_delay);
        self.send(ReleaseCommand::SHUTTER | ReleaseCommand::LED_ON | ReleaseCommand::LED_RED)?;
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
