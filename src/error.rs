//! Custom error types for the exposure subsystem.
//!
//! Errors are layered the same way the control path is layered:
//!
//! - **`BackendError`**: raised by the camera control layer (capability tree, event
//!   source, file transfer). `Busy` is the only transient condition.
//! - **`ConfigError`**: raised by [`ConfigWriter`](crate::exposure::ConfigWriter) after
//!   it has absorbed (or given up on) transient contention.
//! - **`ShutterError`**: raised by a shutter release strategy while opening, closing or
//!   mirror-locking.
//! - **`ExposureError`**: the top-level error returned by
//!   [`ExposureCoordinator`](crate::exposure::ExposureCoordinator). Each variant names the
//!   stage that failed so a caller can decide whether to retry the whole capture.
//!
//! Deleting a downloaded file from camera storage is best-effort; its failure is logged
//! and never surfaces here.

use crate::exposure::ShutterKind;
use thiserror::Error;

/// Convenience alias for results using the top-level exposure error.
pub type ExposureResult<T> = std::result::Result<T, ExposureError>;

/// Errors reported by the external camera control layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The camera is temporarily unable to accept the request.
    #[error("Camera is busy")]
    Busy,

    #[error("No widget named '{0}' in the camera configuration tree")]
    UnknownWidget(String),

    #[error("Value rejected for widget '{widget}': {reason}")]
    InvalidValue { widget: String, reason: String },

    #[error("Camera I/O error: {0}")]
    Io(String),

    #[error("Camera error: {0}")]
    Other(String),
}

impl BackendError {
    /// True for the transient "device busy" condition that writers may retry.
    pub fn is_busy(&self) -> bool {
        matches!(self, BackendError::Busy)
    }
}

/// Errors from writing a configuration value to the camera.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Every attempt reported "device busy".
    #[error("Camera stayed busy while writing '{key}' ({attempts} attempts)")]
    Busy { key: String, attempts: u32 },

    #[error("Camera rejected write to '{key}': {source}")]
    Rejected {
        key: String,
        #[source]
        source: BackendError,
    },

    #[error("No widget named '{0}'")]
    UnknownWidget(String),
}

/// Errors from a shutter release strategy.
#[derive(Error, Debug)]
pub enum ShutterError {
    #[error("Failed to open shutter port {port}: {reason}")]
    PortOpen { port: String, reason: String },

    #[error("Shutter release device error: {0}")]
    Device(String),

    #[error("No shutter release device found (tried {tried})")]
    DeviceNotFound { tried: String },

    #[error("Bulb control write failed: {0}")]
    Config(#[from] ConfigError),

    #[error("Mirror lock is not supported by the {0} shutter release")]
    MirrorLockUnsupported(ShutterKind),

    #[error("Serial line error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level errors returned by the exposure coordinator.
#[derive(Error, Debug)]
pub enum ExposureError {
    /// Capability discovery found no usable exposure control.
    #[error("No exposure widget found; capture is unavailable")]
    NoExposureWidget,

    #[error("Invalid exposure request: {0}")]
    InvalidRequest(String),

    #[error("An exposure is already in progress")]
    ExposureInProgress,

    #[error("No exposure has been started")]
    NoExposurePending,

    #[error("Failed to write {setting}: {source}")]
    SettingWrite {
        setting: &'static str,
        #[source]
        source: ConfigError,
    },

    #[error("No bulb-capable shutter release is available")]
    NoBulbControl,

    #[error("Mirror lock is not supported by the {0} shutter release")]
    MirrorLockUnsupported(ShutterKind),

    #[error("Shutter release failed: {0}")]
    Shutter(#[from] ShutterError),

    #[error("Camera capture command failed: {0}")]
    Capture(#[source] BackendError),

    #[error("No image reported by the camera after {timeouts} event timeouts")]
    ImageRetrievalTimeout { timeouts: u32 },

    #[error("Failed to download {folder}/{name}: {source}")]
    Download {
        folder: String,
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("Failed to write image to sink: {0}")]
    Sink(#[from] std::io::Error),

    #[error("Camera query failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Exposure timer has stopped")]
    TimerStopped,

    #[error("Failed to start exposure timer thread: {0}")]
    TimerSpawn(#[source] std::io::Error),
}
