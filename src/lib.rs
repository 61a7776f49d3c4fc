//! # dslr_capture
//!
//! Exposure control and timing for tethered DSLR cameras driven through a gphoto-style
//! camera control layer.
//!
//! A capture request (exposure time, optional mirror-lock delay) is turned into either a
//! camera-timed shutter-speed preset or a bulb exposure held open by one of three
//! shutter release paths and closed by a background timer at the deadline. The finished
//! image is then downloaded and, when it was stored in volatile camera memory, removed.
//!
//! ## Crate Structure
//!
//! - **`camera`**: the capabilities consumed from the camera control layer (configuration
//!   tree, event source, file transfer) and a simulated camera implementing them.
//! - **`exposure`**: capability discovery, busy-tolerant setting writes, shutter release
//!   strategies, the exposure timer, the per-camera coordinator and image retrieval.
//! - **`hardware`**: serial RTS and DSUSB transports for external shutter releases.
//! - **`registry`**: handle-keyed registry of open cameras.
//! - **`config`**: Figment-based configuration (`config/camera.toml` plus environment).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: error types for every layer.

pub mod camera;
pub mod config;
pub mod error;
pub mod exposure;
pub mod hardware;
pub mod logging;
pub mod registry;

pub use error::{ExposureError, ExposureResult};
pub use exposure::{DownloadedImage, ExposureCoordinator, ExposureRequest};
pub use registry::{CameraHandle, CameraRegistry};
