//! DSUSB shutter release transport over `nusb`.
//!
//! The device takes single-byte commands (see [`ReleaseCommand`]) as interrupt OUT
//! transfers on endpoint `0x01` of interface 0.

use crate::error::ShutterError;
use crate::exposure::{ReleaseCommand, ReleaseDevice};
use futures::executor::block_on;
use tracing::debug;

/// Known `(vendor, product)` IDs of DSUSB release devices.
pub const DSUSB_IDS: [(u16, u16); 2] = [(0x134A, 0x9021), (0x134A, 0x9026)];

const INTERFACE: u8 = 0;
const COMMAND_ENDPOINT: u8 = 0x01;

/// An opened DSUSB device.
pub struct Dsusb {
    interface: nusb::Interface,
    product_id: u16,
}

impl std::fmt::Debug for Dsusb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dsusb")
            .field("product_id", &format_args!("{:#06x}", self.product_id))
            .finish_non_exhaustive()
    }
}

fn tried() -> String {
    DSUSB_IDS
        .iter()
        .map(|(vid, pid)| format!("{vid:04x}:{pid:04x}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Dsusb {
    /// Open the first attached DSUSB device.
    pub fn open() -> Result<Self, ShutterError> {
        let info = nusb::list_devices()?
            .find(|d| DSUSB_IDS.contains(&(d.vendor_id(), d.product_id())))
            .ok_or_else(|| ShutterError::DeviceNotFound { tried: tried() })?;
        let product_id = info.product_id();
        let device = info.open()?;
        let interface = device.claim_interface(INTERFACE)?;
        debug!(product_id = %format_args!("{product_id:#06x}"), "DSUSB device opened");
        Ok(Self {
            interface,
            product_id,
        })
    }
}

impl ReleaseDevice for Dsusb {
    fn send(&mut self, command: ReleaseCommand) -> Result<(), ShutterError> {
        block_on(
            self.interface
                .interrupt_out(COMMAND_ENDPOINT, vec![command.bits()]),
        )
        .into_result()
        .map_err(|e| ShutterError::Device(format!("DSUSB command {command} failed: {e}")))?;
        Ok(())
    }
}
