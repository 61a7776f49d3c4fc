//! Exposure control for tethered DSLR cameras.
//!
//! The subsystem is layered leaves first:
//!
//! - [`settings`]: parses the camera's shutter-speed vocabulary into [`CameraCapabilities`]
//! - [`writer`]: writes camera settings, retrying while the camera reports busy
//! - [`shutter`]: the three bulb shutter release paths behind [`ShutterStrategy`]
//! - [`timer`]: the background thread that closes the shutter at the bulb deadline
//! - [`coordinator`]: the per-camera state machine driving a capture end to end
//! - [`retriever`]: downloads the finished image and cleans up camera storage
//!
//! A capture is two calls on [`ExposureCoordinator`]: `start_exposure` returns as soon as
//! the exposure is running, `read_exposure` blocks until it finishes and returns the
//! image.

pub mod coordinator;
pub mod retriever;
pub mod settings;
pub mod shutter;
pub mod timer;
pub mod writer;

pub use coordinator::{ExposureCoordinator, ExposurePhase, OpenOptions};
pub use retriever::{CaptureTarget, DownloadedImage, ImageRetriever, RetrievalPolicy};
pub use settings::{
    parse_shutter_speed, BulbControl, CameraCapabilities, ChoiceSetting, ExposureControl,
    ExposurePreset, SettingsResolver, ShutterSpeed, ShutterSpeedTable,
};
pub use shutter::{
    select_strategy, LineOpener, ReleaseCommand, ReleaseDevice, RtsLine, ShutterHardware,
    ShutterKind, ShutterStrategy, ShutterTiming,
};
pub use timer::{Completion, ExposureTimer, TimerCommand, TimerConfig};
pub use writer::{ConfigWriter, RetryPolicy};

use std::time::Duration;

/// Exposures longer than this many seconds always use bulb when bulb is available.
pub const BULB_THRESHOLD_SECS: f64 = 1.0;

/// A capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureRequest {
    /// Requested exposure time in microseconds.
    pub duration_micros: u32,
    /// Mirror-lock delay in milliseconds, 0 to disable.
    pub mirror_lock_millis: u32,
}

impl ExposureRequest {
    /// A request without mirror lock.
    pub fn new(duration_micros: u32) -> Self {
        Self {
            duration_micros,
            mirror_lock_millis: 0,
        }
    }

    /// A request for `seconds`, rounded to the nearest microsecond.
    pub fn from_secs_f64(seconds: f64) -> Self {
        let micros = (seconds * 1_000_000.0).round();
        Self::new(micros.clamp(0.0, f64::from(u32::MAX)) as u32)
    }

    /// Set the mirror-lock delay.
    #[must_use]
    pub fn with_mirror_lock(mut self, millis: u32) -> Self {
        self.mirror_lock_millis = millis;
        self
    }

    /// Requested exposure time.
    pub fn duration(&self) -> Duration {
        Duration::from_micros(u64::from(self.duration_micros))
    }

    /// Requested exposure time in seconds.
    pub fn seconds(&self) -> f64 {
        f64::from(self.duration_micros) / 1_000_000.0
    }

    /// Mirror-lock delay, if enabled.
    pub fn mirror_lock(&self) -> Option<Duration> {
        (self.mirror_lock_millis > 0)
            .then(|| Duration::from_millis(u64::from(self.mirror_lock_millis)))
    }
}

/// How an exposure is timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    /// The camera times a discrete shutter-speed preset.
    Preset,
    /// The shutter is held open and closed by the exposure timer.
    Bulb,
}

impl std::fmt::Display for ExposureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExposureMode::Preset => f.write_str("preset"),
            ExposureMode::Bulb => f.write_str("bulb"),
        }
    }
}
