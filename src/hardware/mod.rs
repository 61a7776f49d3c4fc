//! Shutter release hardware transports.
//!
//! Low-level access to the two external release paths:
//!
//! - [`serial_port`]: an RTS-keyed serial bulb cable (`serial` feature)
//! - [`dsusb`]: a DSUSB-style USB shutter release (`usb` feature)
//!
//! [`detect`] turns the `shutter_release` configuration section into the
//! [`ShutterHardware`] a camera session selects its strategy from.

#[cfg(feature = "usb")]
pub mod dsusb;
#[cfg(feature = "serial")]
pub mod serial_port;

#[cfg(feature = "usb")]
pub use dsusb::Dsusb;
#[cfg(feature = "serial")]
pub use serial_port::SerialPortOpener;

use crate::config::{ShutterReleaseConfig, ShutterReleaseKind};
use crate::exposure::ShutterHardware;
use tracing::{info, warn};

/// Build the external release hardware named in `config`.
///
/// A USB release that cannot be found is logged and skipped, so the session falls
/// back to a configured serial port or to the camera's own bulb control.
pub fn detect(config: &ShutterReleaseConfig) -> ShutterHardware {
    let mut hardware = ShutterHardware::default();
    let port = config.port.as_deref().filter(|p| !p.trim().is_empty());

    match config.kind {
        ShutterReleaseKind::None => return hardware,
        ShutterReleaseKind::Usb => {
            hardware.usb = detect_usb();
            if hardware.usb.is_some() {
                return hardware;
            }
        }
        ShutterReleaseKind::Serial => {}
    }

    if let Some(port) = port {
        hardware.serial = detect_serial(port);
    } else if config.kind == ShutterReleaseKind::Serial {
        warn!("Serial shutter release selected but no port configured");
    }
    hardware
}

#[cfg(feature = "usb")]
fn detect_usb() -> Option<Box<dyn crate::exposure::ReleaseDevice>> {
    match Dsusb::open() {
        Ok(device) => {
            info!("USB shutter release detected");
            Some(Box::new(device))
        }
        Err(e) => {
            warn!(error = %e, "USB shutter release not available");
            None
        }
    }
}

#[cfg(not(feature = "usb"))]
fn detect_usb() -> Option<Box<dyn crate::exposure::ReleaseDevice>> {
    warn!("USB shutter release requested but built without the `usb` feature");
    None
}

#[cfg(feature = "serial")]
fn detect_serial(port: &str) -> Option<(String, Box<dyn crate::exposure::LineOpener>)> {
    info!(port, "Using serial shutter release");
    Some((port.to_string(), Box::new(SerialPortOpener::default())))
}

#[cfg(not(feature = "serial"))]
fn detect_serial(port: &str) -> Option<(String, Box<dyn crate::exposure::LineOpener>)> {
    warn!(port, "Serial shutter release requested but built without the `serial` feature");
    None
}
