//! Shutter release strategies for bulb exposures.
//!
//! Exactly one strategy drives the shutter for a camera session, chosen when the
//! camera is opened by priority:
//!
//! 1. [`UsbRelease`]: a DSUSB-style release device, if configured and detected
//! 2. [`SerialToggle`]: an RTS-keyed serial cable, if a port is configured
//! 3. [`InternalWidget`]: the camera's own bulb control from its configuration tree
//!
//! Strategies are `Send` so the exposure timer thread can close the shutter at the
//! deadline.

mod serial;
mod usb;
mod widget;

pub use serial::{LineOpener, RtsLine, SerialToggle};
pub use usb::{ReleaseCommand, ReleaseDevice, UsbRelease};
pub use widget::InternalWidget;

use super::settings::CameraCapabilities;
use super::writer::ConfigWriter;
use crate::error::ShutterError;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Which shutter release hardware path is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterKind {
    /// External USB shutter release device.
    UsbRelease,
    /// External serial cable keyed by RTS.
    SerialToggle,
    /// The camera's own bulb control.
    InternalWidget,
}

impl fmt::Display for ShutterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutterKind::UsbRelease => "USB release",
            ShutterKind::SerialToggle => "serial RTS",
            ShutterKind::InternalWidget => "camera bulb control",
        })
    }
}

/// Opens and closes the shutter for a bulb exposure.
///
/// # Contract
/// - `start` opens the shutter; `stop` closes it
/// - `is_open` is true between a successful `start` and the next `stop`
/// - `mirror_lock` raises the mirror and waits `delay` before returning; it runs before
///   `start` and never while the shutter is open
pub trait ShutterStrategy: Send {
    /// Which hardware path this is.
    fn kind(&self) -> ShutterKind;

    /// Open the shutter.
    fn start(&mut self) -> Result<(), ShutterError>;

    /// Close the shutter.
    fn stop(&mut self) -> Result<(), ShutterError>;

    /// Whether the shutter is currently held open by this strategy.
    fn is_open(&self) -> bool;

    /// Whether [`mirror_lock`](Self::mirror_lock) is available.
    fn supports_mirror_lock(&self) -> bool {
        false
    }

    /// Raise the mirror, then wait `delay` for vibrations to settle.
    fn mirror_lock(&mut self, _delay: Duration) -> Result<(), ShutterError> {
        Err(ShutterError::MirrorLockUnsupported(self.kind()))
    }
}

/// Timing constants for the external release paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutterTiming {
    /// Delay between the focus and shutter phases of a USB release command.
    pub usb_phase_delay: Duration,
    /// Length of the RTS pulse that raises the mirror over a serial cable.
    pub serial_mirror_pulse: Duration,
}

impl Default for ShutterTiming {
    fn default() -> Self {
        Self {
            usb_phase_delay: Duration::from_millis(100),
            serial_mirror_pulse: Duration::from_millis(20),
        }
    }
}

/// External release hardware available to a camera session.
#[derive(Default)]
pub struct ShutterHardware {
    /// A detected USB release device.
    pub usb: Option<Box<dyn ReleaseDevice>>,
    /// A serial port path with the opener used to key it.
    pub serial: Option<(String, Box<dyn LineOpener>)>,
}

impl fmt::Debug for ShutterHardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutterHardware")
            .field("usb", &self.usb.is_some())
            .field("serial", &self.serial.as_ref().map(|(port, _)| port))
            .finish()
    }
}

/// Pick the strategy for a session: USB release, then serial toggle, then the camera's
/// own bulb control. Returns `None` when the camera cannot do bulb exposures at all.
pub fn select_strategy(
    hardware: ShutterHardware,
    caps: &CameraCapabilities,
    writer: &ConfigWriter,
    timing: &ShutterTiming,
) -> Option<Box<dyn ShutterStrategy>> {
    let strategy: Box<dyn ShutterStrategy> = if let Some(device) = hardware.usb {
        Box::new(UsbRelease::new(device, timing.usb_phase_delay))
    } else if let Some((port, opener)) = hardware.serial {
        Box::new(SerialToggle::new(port, opener, timing.serial_mirror_pulse))
    } else if let Some(control) = caps.bulb_control.clone() {
        Box::new(InternalWidget::new(
            writer.clone(),
            control,
            caps.auto_exposure_mode.clone(),
        ))
    } else {
        info!("Camera has no bulb capable shutter release");
        return None;
    };
    info!(strategy = %strategy.kind(), "Selected shutter release");
    Some(strategy)
}
