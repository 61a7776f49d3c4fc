//! Registry of open cameras.
//!
//! The registry is an ordinary value owned by the application entry point; there is no
//! process-wide camera table. Each open camera gets its own [`ExposureCoordinator`] (and
//! with it its own timer thread), addressed by a [`CameraHandle`] that is never reused
//! within one registry.
//!
//! # Example
//!
//! ```no_run
//! use dslr_capture::camera::mock::SimulatedCamera;
//! use dslr_capture::exposure::{ExposureRequest, OpenOptions};
//! use dslr_capture::registry::CameraRegistry;
//! use std::sync::Arc;
//!
//! let mut registry = CameraRegistry::new();
//! let handle = registry.open(Arc::new(SimulatedCamera::canon_eos()), OpenOptions::default())?;
//!
//! if let Some(camera) = registry.get_mut(handle) {
//!     camera.start_exposure(ExposureRequest::from_secs_f64(0.25))?;
//!     let image = camera.read_exposure(None)?;
//!     println!("{} ({} bytes)", image.name, image.size);
//! }
//! registry.close(handle);
//! # Ok::<(), dslr_capture::error::ExposureError>(())
//! ```

use crate::camera::CameraBackend;
use crate::error::ExposureResult;
use crate::exposure::{ExposureCoordinator, OpenOptions, ShutterHardware};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Stable identifier of an open camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CameraHandle(u64);

impl CameraHandle {
    /// Raw handle value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CameraHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera#{}", self.0)
    }
}

/// Open cameras keyed by handle.
#[derive(Debug, Default)]
pub struct CameraRegistry {
    cameras: BTreeMap<CameraHandle, ExposureCoordinator>,
    next_handle: u64,
}

impl CameraRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a camera, probing the shutter release hardware named in `options`.
    pub fn open(
        &mut self,
        backend: Arc<dyn CameraBackend>,
        options: OpenOptions,
    ) -> ExposureResult<CameraHandle> {
        let coordinator = ExposureCoordinator::open(backend, options)?;
        Ok(self.insert(coordinator))
    }

    /// Open a camera with already-constructed release hardware.
    pub fn open_with_hardware(
        &mut self,
        backend: Arc<dyn CameraBackend>,
        options: OpenOptions,
        hardware: ShutterHardware,
    ) -> ExposureResult<CameraHandle> {
        let coordinator = ExposureCoordinator::open_with_hardware(backend, options, hardware)?;
        Ok(self.insert(coordinator))
    }

    fn insert(&mut self, coordinator: ExposureCoordinator) -> CameraHandle {
        self.next_handle += 1;
        let handle = CameraHandle(self.next_handle);
        info!(%handle, model = coordinator.model(), "Camera registered");
        self.cameras.insert(handle, coordinator);
        handle
    }

    /// Camera for `handle`
    pub fn get(&self, handle: CameraHandle) -> Option<&ExposureCoordinator> {
        self.cameras.get(&handle)
    }

    /// Camera for `handle`, mutably
    pub fn get_mut(&mut self, handle: CameraHandle) -> Option<&mut ExposureCoordinator> {
        self.cameras.get_mut(&handle)
    }

    /// Close a camera and join its timer thread.
    ///
    /// Returns false if the handle was not open.
    pub fn close(&mut self, handle: CameraHandle) -> bool {
        match self.cameras.remove(&handle) {
            Some(camera) => {
                camera.close();
                debug!(%handle, "Camera unregistered");
                true
            }
            None => false,
        }
    }

    /// Handles of every open camera, in opening order
    pub fn handles(&self) -> Vec<CameraHandle> {
        self.cameras.keys().copied().collect()
    }

    /// Number of open cameras
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// Whether no camera is open
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}
