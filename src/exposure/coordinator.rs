//! Per-camera exposure state machine.
//!
//! ```text
//! Idle ─ start_exposure ─► Starting ─┬─► Bulb{deadline} ──┐
//!   ▲                                └─► Preset{index} ───┤
//!   │                                                     ▼
//!   └──────────── read_exposure ◄──────────── AwaitingCompletion
//! ```
//!
//! A failure while `Starting` restores any settings already written and returns to
//! `Idle` without the shutter ever opening. A failure after the shutter opened closes it
//! through the same strategy before the error is returned.

use super::retriever::{CaptureTarget, DownloadedImage, ImageRetriever, RetrievalPolicy};
use super::settings::{
    BulbControl, CameraCapabilities, ChoiceSetting, SettingsResolver, ShutterSpeedTable,
    CAPTURE_TOGGLE_WIDGET, DEFAULT_MAX_EXPOSURE, DEFAULT_MIN_EXPOSURE,
};
use super::shutter::{
    select_strategy, InternalWidget, ShutterHardware, ShutterKind, ShutterStrategy,
    ShutterTiming,
};
use super::timer::{Completion, ExposureTimer, TimerConfig};
use super::writer::{ConfigWriter, RetryPolicy};
use super::{ExposureMode, ExposureRequest, BULB_THRESHOLD_SECS};
use crate::camera::{CameraBackend, Setting};
use crate::config::ShutterReleaseConfig;
use crate::error::{ExposureError, ExposureResult};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Settings used when opening a camera.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOptions {
    /// Busy-retry policy for setting writes.
    pub retry: RetryPolicy,
    /// Timer wake-up intervals.
    pub timer: TimerConfig,
    /// External release timing.
    pub shutter_timing: ShutterTiming,
    /// Bulb image poll bounds.
    pub retrieval: RetrievalPolicy,
    /// Lower exposure bound used when the camera reports no timed presets.
    pub default_min_exposure: f64,
    /// Seed for the upper exposure bound.
    pub default_max_exposure: f64,
    /// Model substrings on which captured files are never deleted.
    pub delete_exceptions: Vec<String>,
    /// Capture target written when the camera is opened.
    pub capture_target: Option<CaptureTarget>,
    /// External shutter release hardware to detect.
    pub shutter_release: ShutterReleaseConfig,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timer: TimerConfig::default(),
            shutter_timing: ShutterTiming::default(),
            retrieval: RetrievalPolicy::default(),
            default_min_exposure: DEFAULT_MIN_EXPOSURE,
            default_max_exposure: DEFAULT_MAX_EXPOSURE,
            delete_exceptions: vec!["20D".to_string()],
            capture_target: None,
            shutter_release: ShutterReleaseConfig::default(),
        }
    }
}

/// Where the coordinator is in the capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposurePhase {
    /// No exposure in flight.
    Idle,
    /// Settings are being written.
    Starting,
    /// The shutter is held open until `deadline`.
    Bulb {
        /// When the timer closes the shutter.
        deadline: Instant,
    },
    /// A preset capture was handed to the timer thread.
    Preset {
        /// Index of the preset written to the exposure control.
        index: usize,
    },
    /// `read_exposure` is waiting for the exposure to finish.
    AwaitingCompletion,
}

/// How a validated request will be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Bulb { preset: Option<usize> },
    Preset { index: usize },
}

/// Bulb iff (no timed preset OR duration over the threshold) AND a bulb release exists.
fn plan_exposure(
    table: Option<&ShutterSpeedTable>,
    seconds: f64,
    bulb_available: bool,
) -> Option<Plan> {
    let nearest = table.and_then(|t| t.nearest(seconds));
    if (nearest.is_none() || seconds > BULB_THRESHOLD_SECS) && bulb_available {
        return Some(Plan::Bulb {
            preset: table.and_then(ShutterSpeedTable::bulb_index),
        });
    }
    nearest.map(|index| Plan::Preset { index })
}

struct ActiveExposure {
    mode: ExposureMode,
    restore: Vec<(String, Setting)>,
    started: Instant,
}

/// Drives captures on one open camera.
///
/// Owns the camera's capability record, its setting writer, its exposure timer thread
/// and its image retriever. Dropping the coordinator stops the timer thread and closes
/// the shutter if an exposure is still open.
pub struct ExposureCoordinator {
    backend: Arc<dyn CameraBackend>,
    caps: CameraCapabilities,
    writer: ConfigWriter,
    timer: ExposureTimer,
    retriever: ImageRetriever,
    pending_iso: Option<usize>,
    pending_format: Option<usize>,
    phase: ExposurePhase,
    active: Option<ActiveExposure>,
}

impl fmt::Debug for ExposureCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposureCoordinator")
            .field("model", &self.caps.model)
            .field("shutter", &self.timer.shutter_kind())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl ExposureCoordinator {
    /// Open a camera, probing the shutter release hardware named in `options`.
    pub fn open(backend: Arc<dyn CameraBackend>, options: OpenOptions) -> ExposureResult<Self> {
        let hardware = crate::hardware::detect(&options.shutter_release);
        Self::open_with_hardware(backend, options, hardware)
    }

    /// Open a camera with already-constructed release hardware.
    #[instrument(skip_all)]
    pub fn open_with_hardware(
        backend: Arc<dyn CameraBackend>,
        options: OpenOptions,
        hardware: ShutterHardware,
    ) -> ExposureResult<Self> {
        let resolver =
            SettingsResolver::new(options.default_min_exposure, options.default_max_exposure);
        let mut caps = resolver.resolve(backend.as_ref())?;
        let writer = ConfigWriter::new(backend.clone(), options.retry.clone());

        if caps.has_capture_toggle {
            if let Err(e) = writer.write(CAPTURE_TOGGLE_WIDGET, Setting::Toggle(true)) {
                warn!(error = %e, "Failed to enable capture mode");
            }
        }
        if let Some(target) = options.capture_target {
            match caps.capture_target.as_deref() {
                Some(widget) => {
                    if let Err(e) = writer.write(widget, target.setting()) {
                        warn!(error = %e, ?target, "Failed to set capture target");
                    }
                }
                None => warn!(?target, "Camera has no capture target setting"),
            }
        }

        caps.has_usb_shutter_release = hardware.usb.is_some();
        caps.has_serial_bulb_port = hardware.serial.is_some();
        let strategy = select_strategy(hardware, &caps, &writer, &options.shutter_timing);
        let timer = ExposureTimer::spawn(backend.clone(), strategy, options.timer)
            .map_err(ExposureError::TimerSpawn)?;

        let retriever = ImageRetriever::new(
            backend.clone(),
            options.retrieval,
            caps.capture_target.clone(),
            caps.model.clone(),
            options.delete_exceptions,
        );

        info!(
            manufacturer = caps.manufacturer.as_deref(),
            model = caps.model.as_deref(),
            shutter = ?timer.shutter_kind(),
            "Camera opened"
        );

        Ok(Self {
            backend,
            caps,
            writer,
            timer,
            retriever,
            pending_iso: None,
            pending_format: None,
            phase: ExposurePhase::Idle,
            active: None,
        })
    }

    /// Capability record resolved at open.
    pub fn capabilities(&self) -> &CameraCapabilities {
        &self.caps
    }

    /// Current state of the capture cycle.
    pub fn phase(&self) -> ExposurePhase {
        self.phase
    }

    /// Shutter release path used for bulb exposures.
    pub fn shutter_kind(&self) -> Option<ShutterKind> {
        self.timer.shutter_kind()
    }

    /// Supported exposure range in seconds, `(min, max)`.
    pub fn exposure_range(&self) -> (f64, f64) {
        (self.caps.min_exposure, self.caps.max_exposure)
    }

    /// Preset labels offered as quick-exposure choices.
    pub fn list_exposure_presets(&self) -> Vec<String> {
        self.caps.quick_presets()
    }

    /// Camera manufacturer.
    pub fn manufacturer(&self) -> Option<&str> {
        self.caps.manufacturer.as_deref()
    }

    /// Camera model.
    pub fn model(&self) -> Option<&str> {
        self.caps.model.as_deref()
    }

    /// Names of every widget in the camera configuration tree.
    pub fn widget_names(&self) -> ExposureResult<Vec<String>> {
        Ok(self.backend.widget_names()?)
    }

    /// ISO choices, empty when the camera has no ISO setting.
    pub fn iso_choices(&self) -> &[String] {
        self.caps.iso.as_ref().map(|s| s.choices.as_slice()).unwrap_or_default()
    }

    /// Image format choices, empty when the camera has no format setting.
    pub fn format_choices(&self) -> &[String] {
        self.caps.format.as_ref().map(|s| s.choices.as_slice()).unwrap_or_default()
    }

    /// ISO label the camera currently reports.
    pub fn current_iso(&self) -> ExposureResult<Option<String>> {
        self.current_label(self.caps.iso.as_ref())
    }

    /// Image format label the camera currently reports.
    pub fn current_format(&self) -> ExposureResult<Option<String>> {
        self.current_label(self.caps.format.as_ref())
    }

    fn current_label(&self, setting: Option<&ChoiceSetting>) -> ExposureResult<Option<String>> {
        let Some(setting) = setting else {
            return Ok(None);
        };
        Ok(self
            .writer
            .current(&setting.widget)?
            .and_then(|v| v.current_label().map(str::to_string)))
    }

    /// ISO choice applied at the next exposure. `None` keeps the camera's setting.
    pub fn set_iso(&mut self, index: Option<usize>) -> ExposureResult<()> {
        check_choice("ISO", self.caps.iso.as_ref(), index)?;
        self.pending_iso = index;
        Ok(())
    }

    /// Image format choice applied at the next exposure. `None` keeps the camera's setting.
    pub fn set_format(&mut self, index: Option<usize>) -> ExposureResult<()> {
        check_choice("image format", self.caps.format.as_ref(), index)?;
        self.pending_format = index;
        Ok(())
    }

    /// Select where the camera stores captured files.
    pub fn set_capture_target(&self, target: CaptureTarget) -> ExposureResult<()> {
        let widget = self.caps.capture_target.as_deref().ok_or_else(|| {
            ExposureError::InvalidRequest("camera has no capture target setting".into())
        })?;
        self.writer
            .write(widget, target.setting())
            .map_err(|source| ExposureError::SettingWrite {
                setting: "capture target",
                source,
            })?;
        info!(?target, "Capture target set");
        Ok(())
    }

    /// Where the camera currently stores captured files.
    pub fn capture_target(&self) -> ExposureResult<Option<CaptureTarget>> {
        Ok(self.retriever.capture_target()?)
    }

    /// Turn off live view if the camera has a viewfinder toggle.
    pub fn stop_preview(&self) -> ExposureResult<()> {
        let Some(widget) = self.caps.viewfinder.as_deref() else {
            debug!("Camera has no viewfinder toggle");
            return Ok(());
        };
        self.writer
            .write(widget, Setting::Toggle(false))
            .map_err(|source| ExposureError::SettingWrite {
                setting: "viewfinder",
                source,
            })
    }

    /// Start an exposure and return as soon as it is running.
    ///
    /// Returns the mode chosen for the request. Collect the image with
    /// [`read_exposure`](Self::read_exposure).
    #[instrument(skip(self), fields(duration_us = request.duration_micros))]
    pub fn start_exposure(&mut self, request: ExposureRequest) -> ExposureResult<ExposureMode> {
        if self.active.is_some() {
            return Err(ExposureError::ExposureInProgress);
        }
        let Some(control) = self.caps.exposure.as_ref() else {
            return Err(ExposureError::NoExposureWidget);
        };
        let exposure_widget = control.widget().to_string();

        let seconds = request.seconds();
        if request.duration_micros == 0 {
            return Err(ExposureError::InvalidRequest(
                "exposure time must be positive".into(),
            ));
        }
        if seconds > self.caps.max_exposure {
            return Err(ExposureError::InvalidRequest(format!(
                "exposure of {seconds}s exceeds the camera maximum of {}s",
                self.caps.max_exposure
            )));
        }

        let bulb_available = self.timer.shutter_kind().is_some();
        let plan = plan_exposure(control.table(), seconds, bulb_available)
            .ok_or(ExposureError::NoBulbControl)?;

        if request.mirror_lock().is_some() {
            self.check_mirror_lock()?;
        }

        self.phase = ExposurePhase::Starting;
        let mut restore = Vec::new();
        match self.begin(plan, &exposure_widget, request, &mut restore) {
            Ok(phase) => {
                let mode = match plan {
                    Plan::Bulb { .. } => ExposureMode::Bulb,
                    Plan::Preset { .. } => ExposureMode::Preset,
                };
                info!(%mode, seconds, "Exposure started");
                self.phase = phase;
                self.active = Some(ActiveExposure {
                    mode,
                    restore,
                    started: Instant::now(),
                });
                Ok(mode)
            }
            Err(e) => {
                warn!(error = %e, "Exposure setup failed");
                self.restore_settings(restore);
                self.phase = ExposurePhase::Idle;
                Err(e)
            }
        }
    }

    fn begin(
        &self,
        plan: Plan,
        exposure_widget: &str,
        request: ExposureRequest,
        restore: &mut Vec<(String, Setting)>,
    ) -> ExposureResult<ExposurePhase> {
        if let (Some(index), Some(iso)) = (self.pending_iso, self.caps.iso.as_ref()) {
            self.apply_choice(&iso.widget, index, "ISO", restore)?;
        }
        if let (Some(index), Some(format)) = (self.pending_format, self.caps.format.as_ref()) {
            self.apply_choice(&format.widget, index, "image format", restore)?;
        }

        match plan {
            Plan::Bulb { preset } => {
                if let Some(bulb) = preset {
                    let current = self
                        .writer
                        .current(exposure_widget)?
                        .and_then(|v| v.current_index());
                    if current != Some(bulb) {
                        self.apply_choice(exposure_widget, bulb, "exposure", restore)?;
                    }
                }
                if let Some(delay) = request.mirror_lock() {
                    self.lock_mirror(delay)?;
                }
                let deadline = self.timer.arm_bulb(request.duration())?;
                Ok(ExposurePhase::Bulb { deadline })
            }
            Plan::Preset { index } => {
                self.apply_choice(exposure_widget, index, "exposure", restore)?;
                if let Some(delay) = request.mirror_lock() {
                    self.lock_mirror(delay)?;
                }
                // A serial cable keys every exposure; the camera times the shutter and
                // the timer releases the line at the deadline.
                if self.timer.shutter_kind() == Some(ShutterKind::SerialToggle) {
                    self.timer.arm_bulb(request.duration())?;
                } else {
                    self.timer.arm_preset();
                }
                Ok(ExposurePhase::Preset { index })
            }
        }
    }

    /// The camera's remote release menu, if it has one.
    fn remote_release(&self) -> Option<&BulbControl> {
        self.caps
            .bulb_control
            .as_ref()
            .filter(|c| matches!(c, BulbControl::RemoteRelease { .. }))
    }

    fn check_mirror_lock(&self) -> ExposureResult<()> {
        match self.timer.shutter_kind() {
            Some(ShutterKind::UsbRelease) => Err(ExposureError::MirrorLockUnsupported(
                ShutterKind::UsbRelease,
            )),
            _ if self.remote_release().is_some() || self.timer.supports_mirror_lock() => Ok(()),
            Some(kind) => Err(ExposureError::MirrorLockUnsupported(kind)),
            None => Err(ExposureError::NoBulbControl),
        }
    }

    /// Raise the mirror and wait `delay`.
    ///
    /// The remote release menu is used when the camera has one, otherwise the session
    /// strategy. Events the press left queued are drained so the exposure's own
    /// `FileAdded` is the one retrieved.
    fn lock_mirror(&self, delay: Duration) -> ExposureResult<()> {
        match self.remote_release() {
            Some(control) => {
                InternalWidget::new(self.writer.clone(), control.clone(), None)
                    .mirror_lock(delay)?;
            }
            None => self.timer.mirror_lock(delay)?,
        }
        let drained = self.retriever.drain_events();
        if drained > 0 {
            debug!(drained, "Discarded events queued by mirror lock");
        }
        Ok(())
    }

    /// Write a choice index, remembering the previous one for restoration.
    fn apply_choice(
        &self,
        widget: &str,
        index: usize,
        setting: &'static str,
        restore: &mut Vec<(String, Setting)>,
    ) -> ExposureResult<()> {
        let previous = self.writer.current(widget)?.and_then(|v| v.current_index());
        self.writer
            .write(widget, Setting::Index(index))
            .map_err(|source| ExposureError::SettingWrite { setting, source })?;
        if let Some(previous) = previous.filter(|&p| p != index) {
            restore.push((widget.to_string(), Setting::Index(previous)));
        }
        Ok(())
    }

    fn restore_settings(&self, restore: Vec<(String, Setting)>) {
        for (widget, value) in restore.into_iter().rev() {
            if let Err(e) = self.writer.write(&widget, value) {
                warn!(widget = %widget, error = %e, "Failed to restore camera setting");
            }
        }
    }

    /// Block until the running exposure finishes, then return its image.
    ///
    /// When `sink` is given the image bytes are written to it and the returned
    /// [`DownloadedImage`] carries no data.
    #[instrument(skip_all)]
    pub fn read_exposure(
        &mut self,
        sink: Option<&mut dyn Write>,
    ) -> ExposureResult<DownloadedImage> {
        let active = self.active.take().ok_or(ExposureError::NoExposurePending)?;
        self.phase = ExposurePhase::AwaitingCompletion;

        let completion = self.timer.wait_for_completion();
        debug!(
            mode = %active.mode,
            elapsed_ms = active.started.elapsed().as_millis() as u64,
            "Exposure finished"
        );
        self.restore_settings(active.restore);

        let result = match completion {
            Some(Completion::ShutterClosed { result: Ok(()), .. }) => {
                self.retriever.await_file(sink)
            }
            Some(Completion::ShutterClosed { result: Err(e), .. }) => Err(e.into()),
            Some(Completion::Captured(Ok(path))) => self.retriever.fetch(&path, sink),
            Some(Completion::Captured(Err(e))) => Err(ExposureError::Capture(e)),
            None => Err(ExposureError::TimerStopped),
        };

        if let Err(e) = &result {
            warn!(error = %e, "Exposure failed");
            if let Err(close) = self.timer.close_shutter_if_open() {
                warn!(error = %close, "Failed to close shutter after error");
            }
        }
        self.phase = ExposurePhase::Idle;
        result
    }

    /// Close the camera: stop the timer thread and close the shutter if still open.
    pub fn close(mut self) {
        self.timer.shutdown();
        info!(model = self.caps.model.as_deref(), "Camera closed");
    }
}

fn check_choice(
    name: &str,
    setting: Option<&ChoiceSetting>,
    index: Option<usize>,
) -> ExposureResult<()> {
    let Some(index) = index else {
        return Ok(());
    };
    match setting {
        None => Err(ExposureError::InvalidRequest(format!(
            "camera has no {name} setting"
        ))),
        Some(s) if index >= s.choices.len() => Err(ExposureError::InvalidRequest(format!(
            "{name} index {index} out of range (0..{})",
            s.choices.len()
        ))),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(labels: &[&str]) -> ShutterSpeedTable {
        ShutterSpeedTable::parse(labels, DEFAULT_MIN_EXPOSURE, DEFAULT_MAX_EXPOSURE).unwrap()
    }

    #[test]
    fn test_short_exposure_uses_nearest_preset() {
        let t = table(&["1/2", "1", "bulb"]);
        assert_eq!(
            plan_exposure(Some(&t), 0.5, true),
            Some(Plan::Preset { index: 0 })
        );
        assert_eq!(
            plan_exposure(Some(&t), 1.0, true),
            Some(Plan::Preset { index: 1 })
        );
    }

    #[test]
    fn test_long_exposure_uses_bulb() {
        let t = table(&["1/2", "1", "bulb"]);
        assert_eq!(
            plan_exposure(Some(&t), 5.0, true),
            Some(Plan::Bulb { preset: Some(2) })
        );
        assert_eq!(
            plan_exposure(Some(&t), 1.000_001, true),
            Some(Plan::Bulb { preset: Some(2) })
        );
    }

    #[test]
    fn test_long_exposure_without_bulb_falls_back_to_preset() {
        let t = table(&["1/2", "1", "30"]);
        assert_eq!(
            plan_exposure(Some(&t), 20.0, false),
            Some(Plan::Preset { index: 2 })
        );
    }

    #[test]
    fn test_no_presets_always_bulb() {
        assert_eq!(
            plan_exposure(None, 0.01, true),
            Some(Plan::Bulb { preset: None })
        );
        let bulb_only = table(&["bulb"]);
        assert_eq!(
            plan_exposure(Some(&bulb_only), 0.01, true),
            Some(Plan::Bulb { preset: Some(0) })
        );
        assert_eq!(plan_exposure(None, 0.01, false), None);
    }

    #[test]
    fn test_check_choice() {
        let iso = ChoiceSetting {
            widget: "iso".into(),
            choices: vec!["100".into(), "200".into()],
            current: Some(0),
        };
        assert!(check_choice("ISO", Some(&iso), Some(1)).is_ok());
        assert!(check_choice("ISO", Some(&iso), None).is_ok());
        assert!(matches!(
            check_choice("ISO", Some(&iso), Some(2)),
            Err(ExposureError::InvalidRequest(_))
        ));
        assert!(matches!(
            check_choice("ISO", None, Some(0)),
            Err(ExposureError::InvalidRequest(_))
        ));
    }
}
