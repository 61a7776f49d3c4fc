//! Bulb exposures through the camera's own configuration tree.

use super::{ShutterKind, ShutterStrategy};
use crate::camera::{Setting, WidgetValue};
use crate::error::ShutterError;
use crate::exposure::settings::BulbControl;
use crate::exposure::writer::ConfigWriter;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shutter strategy that holds the camera's bulb control.
///
/// Canon bodies expose a remote-release menu that is driven with press/release
/// choices; other bodies expose a plain boolean `bulb` toggle.
#[derive(Debug)]
pub struct InternalWidget {
    writer: ConfigWriter,
    control: BulbControl,
    auto_exposure_mode: Option<String>,
    open: bool,
}

impl InternalWidget {
    /// Strategy over the resolved bulb control.
    pub fn new(
        writer: ConfigWriter,
        control: BulbControl,
        auto_exposure_mode: Option<String>,
    ) -> Self {
        Self {
            writer,
            control,
            auto_exposure_mode,
            open: false,
        }
    }

    fn press(&self) -> Setting {
        match &self.control {
            BulbControl::RemoteRelease { press_full, .. } => Setting::Index(*press_full),
            BulbControl::Toggle { .. } => Setting::Toggle(true),
        }
    }

    fn release(&self) -> Setting {
        match &self.control {
            BulbControl::RemoteRelease { release_full, .. } => Setting::Index(*release_full),
            BulbControl::Toggle { .. } => Setting::Toggle(false),
        }
    }

    /// Bulb exposures only work in Manual or Bulb mode; anything else is worth a warning.
    fn check_exposure_mode(&self) {
        let Some(widget) = self.auto_exposure_mode.as_deref() else {
            return;
        };
        match self.writer.current(widget) {
            Ok(Some(WidgetValue::Choice { current, choices })) => {
                let label = current.and_then(|i| choices.get(i)).map(String::as_str);
                let suitable = label.is_some_and(|l| {
                    let l = l.trim().to_ascii_lowercase();
                    l == "bulb" || l == "manual" || l == "m"
                });
                if !suitable {
                    warn!(
                        mode = label.unwrap_or("unknown"),
                        "Camera is not in Manual or Bulb mode, bulb exposure may fail"
                    );
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Could not read auto exposure mode"),
        }
    }
}

impl ShutterStrategy for InternalWidget {
    fn kind(&self) -> ShutterKind {
        ShutterKind::InternalWidget
    }

    fn start(&mut self) -> Result<(), ShutterError> {
        self.check_exposure_mode();
        self.writer.write(self.control.widget(), self.press())?;
        debug!(widget = self.control.widget(), "Bulb control pressed");
        self.open = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ShutterError> {
        self.writer.write(self.control.widget(), self.release())?;
        debug!(widget = self.control.widget(), "Bulb control released");
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn supports_mirror_lock(&self) -> bool {
        matches!(self.control, BulbControl::RemoteRelease { .. })
    }

    fn mirror_lock(&mut self, delay: Duration) -> Result<(), ShutterError> {
        if !self.supports_mirror_lock() {
            return Err(ShutterError::MirrorLockUnsupported(self.kind()));
        }
        info!(delay_ms = delay.as_millis() as u64, "Locking mirror");
        self.writer.write(self.control.widget(), self.press())?;
        self.writer.write(self.control.widget(), self.release())?;
        thread::sleep(delay);
        Ok(())
    }
}
