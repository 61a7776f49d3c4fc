//! Image retrieval after an exposure completes.
//!
//! Preset exposures return the file path directly, so the file is downloaded at once.
//! Bulb exposures are ended externally and the camera announces the file through its
//! event stream, so the retriever polls for `FileAdded` first.

use crate::camera::{CameraBackend, CameraEvent, CameraFilePath, Setting};
use crate::error::{BackendError, ExposureError, ExposureResult};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on events consumed by one drain.
const MAX_DRAINED_EVENTS: usize = 32;

/// Bounds for the bulb event poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalPolicy {
    /// Timeout passed to each event wait.
    pub event_timeout: Duration,
    /// Give up after this many timed-out waits.
    pub max_timeouts: u32,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            event_timeout: Duration::from_secs(1),
            max_timeouts: 10,
        }
    }
}

/// Where the camera stores captured files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTarget {
    /// Volatile internal memory (first capture target choice).
    Internal,
    /// Removable memory card.
    Card,
}

impl CaptureTarget {
    fn from_index(index: usize) -> Self {
        if index == 0 {
            CaptureTarget::Internal
        } else {
            CaptureTarget::Card
        }
    }

    fn index(self) -> usize {
        match self {
            CaptureTarget::Internal => 0,
            CaptureTarget::Card => 1,
        }
    }

    /// Widget value selecting this target.
    pub fn setting(self) -> Setting {
        Setting::Index(self.index())
    }
}

/// A file downloaded from the camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    /// Camera folder the file was stored in.
    pub folder: String,
    /// File name on the camera.
    pub name: String,
    /// Width in pixels, 0 if the camera did not report it.
    pub width: u32,
    /// Height in pixels, 0 if the camera did not report it.
    pub height: u32,
    /// File contents. Empty when the contents were written to a caller-supplied sink.
    pub data: Vec<u8>,
    /// Size of the file in bytes.
    pub size: usize,
}

impl DownloadedImage {
    /// Lowercase file extension, e.g. `cr2` or `jpg`.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    /// Location of the file on the camera.
    pub fn path(&self) -> CameraFilePath {
        CameraFilePath::new(self.folder.clone(), self.name.clone())
    }
}

/// Downloads finished exposures and cleans up camera storage.
pub struct ImageRetriever {
    backend: Arc<dyn CameraBackend>,
    policy: RetrievalPolicy,
    capture_target_widget: Option<String>,
    model: Option<String>,
    delete_exceptions: Vec<String>,
}

impl std::fmt::Debug for ImageRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRetriever")
            .field("policy", &self.policy)
            .field("model", &self.model)
            .field("delete_exceptions", &self.delete_exceptions)
            .finish_non_exhaustive()
    }
}

impl ImageRetriever {
    /// Create a retriever.
    ///
    /// Files captured to internal memory are deleted after download unless `model`
    /// contains one of `delete_exceptions`; on those bodies deleting breaks the next
    /// capture.
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        policy: RetrievalPolicy,
        capture_target_widget: Option<String>,
        model: Option<String>,
        delete_exceptions: Vec<String>,
    ) -> Self {
        Self {
            backend,
            policy,
            capture_target_widget,
            model,
            delete_exceptions,
        }
    }

    /// Current capture target, if the camera exposes one.
    pub fn capture_target(&self) -> Result<Option<CaptureTarget>, BackendError> {
        let Some(widget) = self.capture_target_widget.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .backend
            .widget(widget)?
            .and_then(|w| w.value.current_index())
            .map(CaptureTarget::from_index))
    }

    /// Poll the event stream until the camera reports a new file, then download it.
    pub fn await_file(&self, sink: Option<&mut dyn Write>) -> ExposureResult<DownloadedImage> {
        let mut timeouts = 0;
        loop {
            let event = self
                .backend
                .wait_for_event(self.policy.event_timeout)
                .unwrap_or_else(|e| {
                    debug!(error = %e, "Event wait failed");
                    CameraEvent::Timeout
                });
            match event {
                CameraEvent::FileAdded(path) => {
                    debug!(path = %path, "Camera reported new file");
                    return self.fetch(&path, sink);
                }
                CameraEvent::Timeout => {
                    timeouts += 1;
                    debug!(timeouts, "Waiting for image from camera");
                    if timeouts >= self.policy.max_timeouts {
                        return Err(ExposureError::ImageRetrievalTimeout { timeouts });
                    }
                }
                CameraEvent::CaptureComplete => debug!("Camera reported capture complete"),
                CameraEvent::Unknown(kind) => debug!(kind = %kind, "Ignoring camera event"),
            }
        }
    }

    /// Consume events the camera has already queued, without waiting.
    ///
    /// A mirror-lock press on a body without mirror lockup enabled is a full exposure,
    /// so its `FileAdded` must not be taken for the real image. Files reported here go
    /// through the usual delete policy. Returns the number of events discarded.
    pub fn drain_events(&self) -> usize {
        let mut drained = 0;
        while drained < MAX_DRAINED_EVENTS {
            match self.backend.wait_for_event(Duration::ZERO) {
                Ok(CameraEvent::Timeout) => break,
                Ok(CameraEvent::FileAdded(path)) => {
                    warn!(path = %path, "Discarding file reported before the exposure");
                    self.cleanup(&path);
                }
                Ok(event) => debug!(?event, "Discarding stale camera event"),
                Err(e) => {
                    debug!(error = %e, "Event drain stopped");
                    break;
                }
            }
            drained += 1;
        }
        drained
    }

    /// Download `path`, writing the contents to `sink` when one is given.
    pub fn fetch(
        &self,
        path: &CameraFilePath,
        sink: Option<&mut dyn Write>,
    ) -> ExposureResult<DownloadedImage> {
        let bytes = self
            .backend
            .download(path)
            .map_err(|source| ExposureError::Download {
                folder: path.folder.clone(),
                name: path.name.clone(),
                source,
            })?;
        let info = self.backend.file_info(path).unwrap_or_else(|e| {
            debug!(error = %e, "No image dimensions reported");
            Default::default()
        });

        let size = bytes.len();
        let data = match sink {
            Some(sink) => {
                sink.write_all(&bytes)?;
                sink.flush()?;
                Vec::new()
            }
            None => bytes,
        };
        info!(path = %path, size, width = info.width, height = info.height, "Downloaded image");

        self.cleanup(path);

        Ok(DownloadedImage {
            folder: path.folder.clone(),
            name: path.name.clone(),
            width: info.width,
            height: info.height,
            data,
            size,
        })
    }

    fn delete_breaks_capture(&self) -> bool {
        self.model.as_deref().is_some_and(|model| {
            self.delete_exceptions
                .iter()
                .any(|exception| model.contains(exception.as_str()))
        })
    }

    fn cleanup(&self, path: &CameraFilePath) {
        match self.capture_target() {
            Ok(Some(CaptureTarget::Internal)) => {}
            Ok(_) => return,
            Err(e) => {
                debug!(error = %e, "Could not read capture target, keeping file");
                return;
            }
        }
        if self.delete_breaks_capture() {
            debug!(model = self.model.as_deref(), "Not deleting file on this model");
            return;
        }
        match self.backend.delete(path) {
            Ok(()) => debug!(path = %path, "Deleted file from camera"),
            Err(e) => warn!(path = %path, error = %e, "Failed to delete file from camera"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::{FaultScenario, SimulatedCamera};
    use crate::camera::CameraBackend as _;
    use crate::camera::ConfigTree;
    use tracing_test::traced_test;

    fn retriever(cam: &Arc<SimulatedCamera>, model: &str) -> ImageRetriever {
        ImageRetriever::new(
            cam.clone(),
            RetrievalPolicy::default(),
            Some("capturetarget".into()),
            Some(model.into()),
            vec!["20D".into()],
        )
    }

    #[test]
    fn test_extension() {
        let image = DownloadedImage {
            folder: "/".into(),
            name: "IMG_0001.CR2".into(),
            width: 0,
            height: 0,
            data: vec![],
            size: 0,
        };
        assert_eq!(image.extension().as_deref(), Some("cr2"));
        let image = DownloadedImage {
            name: "noext".into(),
            ..image
        };
        assert_eq!(image.extension(), None);
    }

    #[test]
    fn test_fetch_downloads_and_deletes_from_internal_ram() {
        let cam = Arc::new(SimulatedCamera::canon_eos().with_image_size(640, 480));
        let path = cam.capture().unwrap();
        let image = retriever(&cam, "Canon EOS 600D").fetch(&path, None).unwrap();
        assert_eq!(image.name, path.name);
        assert_eq!((image.width, image.height), (640, 480));
        assert!(!image.data.is_empty());
        assert_eq!(image.size, image.data.len());
        assert_eq!(cam.deleted(), vec![path]);
    }

    #[test]
    fn test_fetch_to_sink() {
        let cam = Arc::new(SimulatedCamera::canon_eos());
        let path = cam.capture().unwrap();
        let mut sink = Vec::new();
        let image = retriever(&cam, "Canon EOS 600D")
            .fetch(&path, Some(&mut sink))
            .unwrap();
        assert!(image.data.is_empty());
        assert_eq!(image.size, sink.len());
        assert!(!sink.is_empty());
    }

    #[test]
    fn test_no_delete_on_card_or_excepted_model() {
        let cam = Arc::new(SimulatedCamera::canon_eos());
        let path = cam.capture().unwrap();
        retriever(&cam, "Canon EOS 20D").fetch(&path, None).unwrap();
        assert!(cam.deleted().is_empty());

        cam.set("capturetarget", CaptureTarget::Card.setting()).unwrap();
        let path = cam.capture().unwrap();
        retriever(&cam, "Canon EOS 600D").fetch(&path, None).unwrap();
        assert!(cam.deleted().is_empty());
    }

    #[traced_test]
    #[test]
    fn test_delete_failure_is_not_fatal() {
        let cam = Arc::new(SimulatedCamera::canon_eos().with_fault(FaultScenario::DeleteFails));
        let path = cam.capture().unwrap();
        assert!(retriever(&cam, "Canon EOS 600D").fetch(&path, None).is_ok());
        assert!(logs_contain("Failed to delete file from camera"));
    }

    #[test]
    fn test_ten_timeouts_fail() {
        let cam = Arc::new(SimulatedCamera::canon_eos());
        let err = retriever(&cam, "Canon EOS 600D").await_file(None).unwrap_err();
        assert!(matches!(
            err,
            ExposureError::ImageRetrievalTimeout { timeouts: 10 }
        ));
    }

    #[test]
    fn test_file_added_after_timeouts_and_noise() {
        let cam = Arc::new(
            SimulatedCamera::canon_eos().with_fault(FaultScenario::EventTimeouts { count: 9 }),
        );
        cam.queue_event(CameraEvent::Unknown("PTP property changed".into()));
        cam.queue_event(CameraEvent::CaptureComplete);
        let path = cam.queue_file_added();
        let image = retriever(&cam, "Canon EOS 600D").await_file(None).unwrap();
        assert_eq!(image.path(), path);
    }

    #[test]
    fn test_drain_discards_stale_file() {
        let cam = Arc::new(SimulatedCamera::canon_eos());
        let r = retriever(&cam, "Canon EOS 600D");
        assert_eq!(r.drain_events(), 0);

        cam.queue_event(CameraEvent::CaptureComplete);
        let stale = cam.queue_file_added();
        assert_eq!(r.drain_events(), 2);
        assert_eq!(cam.deleted(), vec![stale.clone()]);

        let fresh = cam.queue_file_added();
        let image = r.await_file(None).unwrap();
        assert_eq!(image.path(), fresh);
        assert_ne!(image.path(), stale);
    }

    #[test]
    fn test_download_failure_names_file() {
        let cam = Arc::new(SimulatedCamera::canon_eos());
        let missing = CameraFilePath::new("/store", "IMG_9999.CR2");
        let err = retriever(&cam, "Canon EOS 600D").fetch(&missing, None).unwrap_err();
        assert!(matches!(err, ExposureError::Download { ref name, .. } if name == "IMG_9999.CR2"));
    }

    #[test]
    fn test_capture_target() {
        let cam = Arc::new(SimulatedCamera::canon_eos());
        let r = retriever(&cam, "Canon EOS 600D");
        assert_eq!(r.capture_target().unwrap(), Some(CaptureTarget::Internal));
        cam.set("capturetarget", Setting::Index(1)).unwrap();
        assert_eq!(r.capture_target().unwrap(), Some(CaptureTarget::Card));

        let bare = ImageRetriever::new(cam, RetrievalPolicy::default(), None, None, vec![]);
        assert_eq!(bare.capture_target().unwrap(), None);
    }
}
