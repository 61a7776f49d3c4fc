//! End-to-end capture scenarios against the simulated camera.
//!
//! Each test opens an `ExposureCoordinator` over a `SimulatedCamera` and drives the full
//! start/read cycle, with recording doubles standing in for the serial cable and the
//! USB release device.

use dslr_capture::camera::mock::{FaultScenario, SimulatedCamera};
use dslr_capture::camera::Setting;
use dslr_capture::error::{ConfigError, ExposureError, ShutterError};
use dslr_capture::exposure::{
    CaptureTarget, ExposureCoordinator, ExposureMode, ExposurePhase, ExposureRequest,
    LineOpener, OpenOptions, ReleaseCommand, ReleaseDevice, RetryPolicy, RtsLine,
    ShutterHardware, ShutterKind,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

// =============================================================================
// Recording hardware doubles
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum LineEvent {
    Open,
    Rts(bool),
    Close,
}

type LineLog = Arc<Mutex<Vec<(Instant, LineEvent)>>>;

struct RecordingLine(LineLog);

impl RtsLine for RecordingLine {
    fn set_rts(&mut self, level: bool) -> Result<(), ShutterError> {
        self.0.lock().push((Instant::now(), LineEvent::Rts(level)));
        Ok(())
    }
}

impl Drop for RecordingLine {
    fn drop(&mut self) {
        self.0.lock().push((Instant::now(), LineEvent::Close));
    }
}

struct RecordingOpener(LineLog);

impl LineOpener for RecordingOpener {
    fn open(&self, _port: &str) -> Result<Box<dyn RtsLine>, ShutterError> {
        self.0.lock().push((Instant::now(), LineEvent::Open));
        Ok(Box::new(RecordingLine(self.0.clone())))
    }
}

struct RecordingDevice(Arc<Mutex<Vec<ReleaseCommand>>>);

impl ReleaseDevice for RecordingDevice {
    fn send(&mut self, command: ReleaseCommand) -> Result<(), ShutterError> {
        self.0.lock().push(command);
        Ok(())
    }
}

fn serial_hardware() -> (ShutterHardware, LineLog) {
    let log = LineLog::default();
    let hardware = ShutterHardware {
        usb: None,
        serial: Some((
            "/dev/ttyUSB0".to_string(),
            Box::new(RecordingOpener(log.clone())),
        )),
    };
    (hardware, log)
}

fn line_events(log: &LineLog) -> Vec<LineEvent> {
    log.lock().iter().map(|(_, e)| e.clone()).collect()
}

fn fast_options() -> OpenOptions {
    OpenOptions {
        retry: RetryPolicy {
            max_attempts: 5,
            backoff_delay: Duration::from_millis(10),
        },
        ..OpenOptions::default()
    }
}

fn open(cam: &Arc<SimulatedCamera>, hardware: ShutterHardware) -> ExposureCoordinator {
    ExposureCoordinator::open_with_hardware(cam.clone(), fast_options(), hardware).unwrap()
}

/// Camera exposing presets {"1/2", "1", "bulb"} and a boolean bulb toggle.
fn three_preset_camera() -> Arc<SimulatedCamera> {
    Arc::new(
        SimulatedCamera::new()
            .with_exposure_labels(&["1/2", "1", "bulb"])
            .with_toggle("bulb", false),
    )
}

// =============================================================================
// Mode selection
// =============================================================================

#[test]
fn half_second_uses_nearest_preset_without_arming_timer() {
    let cam = three_preset_camera();
    let mut camera = open(&cam, ShutterHardware::default());

    let mode = camera
        .start_exposure(ExposureRequest::new(500_000))
        .unwrap();
    assert_eq!(mode, ExposureMode::Preset);
    assert_eq!(camera.phase(), ExposurePhase::Preset { index: 0 });
    assert_eq!(cam.writes_to("shutterspeed"), vec![Setting::Index(0)]);

    let image = camera.read_exposure(None).unwrap();
    assert!(image.name.starts_with("IMG_"));
    assert_eq!(cam.captures(), 1);
    assert!(cam.writes_to("bulb").is_empty());
    assert_eq!(camera.phase(), ExposurePhase::Idle);
}

#[test]
fn five_seconds_uses_bulb_and_closes_at_deadline() {
    let cam = three_preset_camera();
    let mut camera = open(&cam, ShutterHardware::default());

    let before = Instant::now();
    let mode = camera
        .start_exposure(ExposureRequest::new(5_000_000))
        .unwrap();
    let after = Instant::now();
    assert_eq!(mode, ExposureMode::Bulb);
    assert_eq!(camera.shutter_kind(), Some(ShutterKind::InternalWidget));

    let ExposurePhase::Bulb { deadline } = camera.phase() else {
        panic!("expected bulb phase, got {:?}", camera.phase());
    };
    assert!(deadline >= before + Duration::from_secs(5));
    assert!(deadline <= after + Duration::from_secs(5));
    assert_eq!(cam.writes_to("shutterspeed"), vec![Setting::Index(2)]);

    let image = camera.read_exposure(None).unwrap();
    assert!(Instant::now() >= deadline);
    assert!(!image.data.is_empty());
    assert_eq!(
        cam.writes_to("bulb"),
        vec![Setting::Toggle(true), Setting::Toggle(false)]
    );
    // exposure control restored to its pre-capture preset
    assert_eq!(
        cam.writes_to("shutterspeed"),
        vec![Setting::Index(2), Setting::Index(0)]
    );
    assert_eq!(cam.captures(), 0);
}

#[test]
fn long_exposure_without_bulb_uses_nearest_preset() {
    let cam = Arc::new(SimulatedCamera::new().with_exposure_labels(&["1/2", "1", "4"]));
    let mut camera = open(&cam, ShutterHardware::default());
    assert_eq!(camera.shutter_kind(), None);

    let mode = camera
        .start_exposure(ExposureRequest::from_secs_f64(5.0))
        .unwrap();
    assert_eq!(mode, ExposureMode::Preset);
    assert_eq!(camera.phase(), ExposurePhase::Preset { index: 2 });
    camera.read_exposure(None).unwrap();
}

#[test]
fn exposure_widget_without_presets_always_uses_bulb() {
    let cam = Arc::new(
        SimulatedCamera::new()
            .with_exposure_labels(&["Auto"])
            .with_toggle("bulb", false),
    );
    let mut camera = open(&cam, ShutterHardware::default());
    let mode = camera
        .start_exposure(ExposureRequest::new(100_000))
        .unwrap();
    assert_eq!(mode, ExposureMode::Bulb);
    assert!(cam.writes_to("shutterspeed").is_empty());
    camera.read_exposure(None).unwrap();
}

// =============================================================================
// Canon remote release
// =============================================================================

#[test]
fn remote_release_bulb_applies_and_restores_iso_and_format() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let mut camera = open(&cam, ShutterHardware::default());
    assert_eq!(camera.current_iso().unwrap().as_deref(), Some("100"));

    camera.set_iso(Some(3)).unwrap();
    camera.set_format(Some(0)).unwrap();
    camera
        .start_exposure(ExposureRequest::from_secs_f64(1.5))
        .unwrap();
    assert_eq!(camera.current_iso().unwrap().as_deref(), Some("400"));

    let image = camera.read_exposure(None).unwrap();
    assert_eq!(image.extension().as_deref(), Some("jpg"));
    assert_eq!(
        cam.writes_to("eosremoterelease"),
        vec![Setting::Index(2), Setting::Index(4)]
    );

    assert_eq!(camera.current_iso().unwrap().as_deref(), Some("100"));
    assert_eq!(camera.current_format().unwrap().as_deref(), Some("RAW"));
    // bulb preset is index 0 and already selected, so never written
    assert!(cam.writes_to("shutterspeed").is_empty());
    // stored in internal RAM on a 600D, so removed after download
    assert_eq!(cam.deleted(), vec![image.path()]);
}

#[test]
fn open_enables_capture_mode_and_reports_capabilities() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let camera = open(&cam, ShutterHardware::default());

    assert_eq!(cam.writes_to("capture"), vec![Setting::Toggle(true)]);
    assert_eq!(camera.manufacturer(), Some("Canon Inc."));
    assert_eq!(camera.model(), Some("Canon EOS 600D"));

    let (min, max) = camera.exposure_range();
    assert!((min - 1.0 / 4000.0).abs() < 1e-12);
    assert!((max - 3600.0).abs() < f64::EPSILON);
    assert_eq!(camera.list_exposure_presets().len(), 14);
    assert_eq!(camera.iso_choices().len(), 7);
    assert!(camera.widget_names().unwrap().contains(&"iso".to_string()));

    let caps = camera.capabilities();
    assert!(caps.has_bulb_widget());
    assert!(caps.capture_target_supported());
    assert!(!caps.has_serial_bulb_port);
    assert!(!caps.has_usb_shutter_release);
}

#[test]
fn small_preset_table_offers_no_quick_presets() {
    let cam = three_preset_camera();
    let camera = open(&cam, ShutterHardware::default());
    assert!(camera.list_exposure_presets().is_empty());
}

#[test]
fn capture_target_and_preview_controls() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let camera = open(&cam, ShutterHardware::default());

    assert_eq!(camera.capture_target().unwrap(), Some(CaptureTarget::Internal));
    camera.set_capture_target(CaptureTarget::Card).unwrap();
    assert_eq!(camera.capture_target().unwrap(), Some(CaptureTarget::Card));

    camera.stop_preview().unwrap();
    assert_eq!(cam.writes_to("viewfinder"), vec![Setting::Toggle(false)]);
}

#[test]
fn configured_capture_target_is_written_at_open() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let options = OpenOptions {
        capture_target: Some(CaptureTarget::Card),
        ..fast_options()
    };
    let camera =
        ExposureCoordinator::open_with_hardware(cam.clone(), options, ShutterHardware::default())
            .unwrap();
    assert_eq!(camera.capture_target().unwrap(), Some(CaptureTarget::Card));
}

#[test]
fn files_are_kept_on_card_and_on_excepted_models() {
    let cam = Arc::new(SimulatedCamera::canon_eos().with_model("Canon EOS 20D"));
    let mut camera = open(&cam, ShutterHardware::default());
    camera.start_exposure(ExposureRequest::new(250_000)).unwrap();
    camera.read_exposure(None).unwrap();
    assert!(cam.deleted().is_empty());

    let cam = Arc::new(SimulatedCamera::canon_eos());
    let mut camera = open(&cam, ShutterHardware::default());
    camera.set_capture_target(CaptureTarget::Card).unwrap();
    camera.start_exposure(ExposureRequest::new(250_000)).unwrap();
    camera.read_exposure(None).unwrap();
    assert!(cam.deleted().is_empty());
}

#[test]
fn image_written_to_sink() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let mut camera = open(&cam, ShutterHardware::default());
    camera.start_exposure(ExposureRequest::new(250_000)).unwrap();

    let mut sink = Vec::new();
    let image = camera.read_exposure(Some(&mut sink)).unwrap();
    assert!(image.data.is_empty());
    assert_eq!(image.size, sink.len());
    assert_eq!((image.width, image.height), (5184, 3456));
}

// =============================================================================
// External release strategies
// =============================================================================

#[test]
fn serial_release_holds_rts_for_the_exposure() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let (hardware, log) = serial_hardware();
    let mut camera = open(&cam, hardware);
    assert_eq!(camera.shutter_kind(), Some(ShutterKind::SerialToggle));
    assert!(camera.capabilities().has_serial_bulb_port);

    camera
        .start_exposure(ExposureRequest::from_secs_f64(1.2))
        .unwrap();
    cam.queue_file_added();
    camera.read_exposure(None).unwrap();

    let entries = log.lock().clone();
    let kinds: Vec<LineEvent> = entries.iter().map(|(_, e)| e.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            LineEvent::Open,
            LineEvent::Rts(true),
            LineEvent::Rts(false),
            LineEvent::Close
        ]
    );
    assert!(entries[2].0 - entries[1].0 >= Duration::from_millis(1200));
    // the camera's own bulb control is untouched
    assert!(cam.writes_to("eosremoterelease").is_empty());
}

#[test]
fn serial_mirror_lock_runs_before_exposure() {
    // no remote release menu, so the cable raises the mirror too
    let cam = Arc::new(SimulatedCamera::new().with_exposure_labels(&["bulb", "30", "1", "1/2"]));
    let (hardware, log) = serial_hardware();
    let mut camera = open(&cam, hardware);

    let started = Instant::now();
    camera
        .start_exposure(ExposureRequest::from_secs_f64(1.1).with_mirror_lock(100))
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));
    cam.queue_file_added();
    camera.read_exposure(None).unwrap();

    assert_eq!(
        line_events(&log),
        vec![
            LineEvent::Open,
            LineEvent::Rts(true),
            LineEvent::Rts(false),
            LineEvent::Close,
            LineEvent::Open,
            LineEvent::Rts(true),
            LineEvent::Rts(false),
            LineEvent::Close,
        ]
    );
}

#[test]
fn serial_mirror_lock_prefers_remote_release_menu() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let (hardware, log) = serial_hardware();
    let mut camera = open(&cam, hardware);

    camera
        .start_exposure(ExposureRequest::from_secs_f64(1.1).with_mirror_lock(50))
        .unwrap();
    // the mirror went up through the menu; its file was discarded
    assert_eq!(
        cam.writes_to("eosremoterelease"),
        vec![Setting::Index(2), Setting::Index(4)]
    );
    assert_eq!(cam.deleted().len(), 1);
    let stale = cam.deleted()[0].clone();

    let expected = cam.queue_file_added();
    let image = camera.read_exposure(None).unwrap();
    assert_eq!(image.path(), expected);
    assert_ne!(image.path(), stale);
    assert_eq!(
        line_events(&log),
        vec![
            LineEvent::Open,
            LineEvent::Rts(true),
            LineEvent::Rts(false),
            LineEvent::Close
        ]
    );
}

#[test]
fn serial_cable_keys_preset_exposures() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let (hardware, log) = serial_hardware();
    let mut camera = open(&cam, hardware);

    let mode = camera
        .start_exposure(ExposureRequest::new(250_000))
        .unwrap();
    assert_eq!(mode, ExposureMode::Preset);
    assert_eq!(camera.phase(), ExposurePhase::Preset { index: 8 });
    assert_eq!(cam.writes_to("shutterspeed"), vec![Setting::Index(8)]);

    cam.queue_file_added();
    camera.read_exposure(None).unwrap();

    let entries = log.lock().clone();
    let kinds: Vec<LineEvent> = entries.iter().map(|(_, e)| e.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            LineEvent::Open,
            LineEvent::Rts(true),
            LineEvent::Rts(false),
            LineEvent::Close
        ]
    );
    assert!(entries[2].0 - entries[1].0 >= Duration::from_millis(250));
    // the camera was never asked to capture on its own
    assert_eq!(cam.captures(), 0);
    assert!(cam.writes_to("eosremoterelease").is_empty());
}

#[test]
fn usb_release_sequences_commands() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let sent = Arc::new(Mutex::new(Vec::new()));
    let hardware = ShutterHardware {
        usb: Some(Box::new(RecordingDevice(sent.clone()))),
        serial: None,
    };
    let mut camera = open(&cam, hardware);
    assert_eq!(camera.shutter_kind(), Some(ShutterKind::UsbRelease));

    camera
        .start_exposure(ExposureRequest::from_secs_f64(1.5))
        .unwrap();
    cam.queue_file_added();
    camera.read_exposure(None).unwrap();

    let bits: Vec<u8> = sent.lock().iter().map(|c| c.bits()).collect();
    assert_eq!(bits, vec![0x22, 0x21, 0x33, 0x31]);
}

#[test]
fn usb_release_refuses_mirror_lock_before_any_hardware_action() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let sent = Arc::new(Mutex::new(Vec::new()));
    let hardware = ShutterHardware {
        usb: Some(Box::new(RecordingDevice(sent.clone()))),
        serial: None,
    };
    let mut camera = open(&cam, hardware);
    camera.set_iso(Some(2)).unwrap();
    let writes_before = cam.writes().len();

    let err = camera
        .start_exposure(ExposureRequest::from_secs_f64(2.0).with_mirror_lock(500))
        .unwrap_err();
    assert!(matches!(
        err,
        ExposureError::MirrorLockUnsupported(ShutterKind::UsbRelease)
    ));
    assert_eq!(cam.writes().len(), writes_before);
    assert!(sent.lock().is_empty());
    assert_eq!(camera.phase(), ExposurePhase::Idle);
}

#[test]
fn remote_release_mirror_lock_returns_the_exposure_file() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let mut camera = open(&cam, ShutterHardware::default());

    let started = Instant::now();
    camera
        .start_exposure(ExposureRequest::from_secs_f64(1.2).with_mirror_lock(50))
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    let image = camera.read_exposure(None).unwrap();

    // the press that raised the mirror left IMG_0001 behind
    assert_eq!(image.name, "IMG_0002.CR2");
    assert_eq!(
        cam.writes_to("eosremoterelease"),
        vec![
            Setting::Index(2),
            Setting::Index(4),
            Setting::Index(2),
            Setting::Index(4)
        ]
    );
    let deleted: Vec<String> = cam.deleted().iter().map(|p| p.name.clone()).collect();
    assert_eq!(deleted, vec!["IMG_0001.CR2", "IMG_0002.CR2"]);
}

#[test]
fn mirror_lockup_body_exposes_on_second_press() {
    let cam = Arc::new(SimulatedCamera::canon_eos().with_mirror_lockup());
    let mut camera = open(&cam, ShutterHardware::default());

    camera
        .start_exposure(ExposureRequest::from_secs_f64(1.2).with_mirror_lock(50))
        .unwrap();
    assert!(cam.mirror_up());
    let image = camera.read_exposure(None).unwrap();

    assert_eq!(image.name, "IMG_0001.CR2");
    assert_eq!(cam.deleted(), vec![image.path()]);
    assert!(!cam.mirror_up());
}

#[test]
fn toggle_bulb_cannot_lock_mirror() {
    let cam = three_preset_camera();
    let mut camera = open(&cam, ShutterHardware::default());

    let err = camera
        .start_exposure(ExposureRequest::from_secs_f64(2.0).with_mirror_lock(100))
        .unwrap_err();
    assert!(matches!(
        err,
        ExposureError::MirrorLockUnsupported(ShutterKind::InternalWidget)
    ));
    assert!(cam.writes_to("bulb").is_empty());
    assert_eq!(camera.phase(), ExposurePhase::Idle);
}

// =============================================================================
// Failure handling
// =============================================================================

#[test]
fn retrieval_timeout_leaves_shutter_closed_and_camera_usable() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let (hardware, log) = serial_hardware();
    let mut camera = open(&cam, hardware);

    camera
        .start_exposure(ExposureRequest::from_secs_f64(1.1))
        .unwrap();
    let err = camera.read_exposure(None).unwrap_err();
    assert!(matches!(
        err,
        ExposureError::ImageRetrievalTimeout { timeouts: 10 }
    ));
    assert_eq!(line_events(&log).last(), Some(&LineEvent::Close));
    assert_eq!(camera.phase(), ExposurePhase::Idle);

    camera
        .start_exposure(ExposureRequest::new(250_000))
        .unwrap();
    cam.queue_file_added();
    assert!(camera.read_exposure(None).is_ok());
}

#[test]
fn failed_setting_write_aborts_before_shutter_opens() {
    let cam = Arc::new(SimulatedCamera::canon_eos().with_fault(FaultScenario::RejectWrite {
        widget: "imageformat".into(),
    }));
    let mut camera = open(&cam, ShutterHardware::default());
    camera.set_iso(Some(4)).unwrap();
    camera.set_format(Some(2)).unwrap();

    let err = camera
        .start_exposure(ExposureRequest::from_secs_f64(2.0))
        .unwrap_err();
    assert!(matches!(
        err,
        ExposureError::SettingWrite {
            setting: "image format",
            source: ConfigError::Rejected { .. }
        }
    ));
    assert!(cam.writes_to("eosremoterelease").is_empty());
    // ISO was already written and is put back
    assert_eq!(
        cam.writes_to("iso"),
        vec![Setting::Index(4), Setting::Index(1)]
    );
    assert_eq!(camera.phase(), ExposurePhase::Idle);
}

#[test]
fn busy_camera_is_retried_during_setup() {
    let cam = Arc::new(
        SimulatedCamera::canon_eos().with_fault(FaultScenario::BusyWrites { count: 4 }),
    );
    let mut camera = open(&cam, ShutterHardware::default());
    // the capture-mode write at open absorbs all four busy responses
    assert_eq!(cam.write_attempts(), 5);
    assert_eq!(cam.writes_to("capture"), vec![Setting::Toggle(true)]);

    camera.start_exposure(ExposureRequest::new(250_000)).unwrap();
    camera.read_exposure(None).unwrap();
    assert_eq!(cam.captures(), 1);
}

#[test]
fn persistent_busy_fails_the_setting_write() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let mut camera = open(&cam, ShutterHardware::default());
    camera.set_iso(Some(5)).unwrap();

    let busy = Arc::new(
        SimulatedCamera::canon_eos().with_fault(FaultScenario::BusyWrites { count: 10 }),
    );
    let mut busy_camera = open(&busy, ShutterHardware::default());
    busy_camera.set_iso(Some(5)).unwrap();
    // five attempts at open, five more on the ISO write
    let err = busy_camera
        .start_exposure(ExposureRequest::from_secs_f64(2.0))
        .unwrap_err();
    assert!(matches!(
        err,
        ExposureError::SettingWrite {
            setting: "ISO",
            source: ConfigError::Busy { attempts: 5, .. }
        }
    ));
    assert_eq!(busy.write_attempts(), 10);
    assert!(busy.writes_to("eosremoterelease").is_empty());

    camera.start_exposure(ExposureRequest::new(250_000)).unwrap();
    camera.read_exposure(None).unwrap();
    assert_eq!(camera.current_iso().unwrap().as_deref(), Some("100"));
}

#[test]
fn capture_failure_is_reported() {
    let cam = Arc::new(SimulatedCamera::canon_eos().with_fault(FaultScenario::CaptureFails));
    let mut camera = open(&cam, ShutterHardware::default());
    camera.start_exposure(ExposureRequest::new(250_000)).unwrap();
    assert!(matches!(
        camera.read_exposure(None),
        Err(ExposureError::Capture(_))
    ));
    assert_eq!(camera.phase(), ExposurePhase::Idle);
}

#[test]
fn request_validation() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let mut camera = open(&cam, ShutterHardware::default());

    assert!(matches!(
        camera.start_exposure(ExposureRequest::new(0)),
        Err(ExposureError::InvalidRequest(_))
    ));
    assert!(matches!(
        camera.start_exposure(ExposureRequest::from_secs_f64(4000.0)),
        Err(ExposureError::InvalidRequest(_))
    ));
    assert!(matches!(
        camera.set_iso(Some(99)),
        Err(ExposureError::InvalidRequest(_))
    ));
    assert!(matches!(
        camera.read_exposure(None),
        Err(ExposureError::NoExposurePending)
    ));
    assert!(cam.writes_to("shutterspeed").is_empty());
}

#[test]
fn second_start_is_rejected_while_exposing() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let mut camera = open(&cam, ShutterHardware::default());
    camera.start_exposure(ExposureRequest::new(250_000)).unwrap();
    assert!(matches!(
        camera.start_exposure(ExposureRequest::new(250_000)),
        Err(ExposureError::ExposureInProgress)
    ));
    camera.read_exposure(None).unwrap();
    assert_eq!(cam.captures(), 1);
}

#[test]
fn camera_without_exposure_control_cannot_capture() {
    let cam = Arc::new(SimulatedCamera::new().with_toggle("bulb", false));
    let mut camera = open(&cam, ShutterHardware::default());
    assert!(matches!(
        camera.start_exposure(ExposureRequest::new(1_000_000)),
        Err(ExposureError::NoExposureWidget)
    ));
}

#[test]
fn closing_mid_exposure_closes_the_shutter() {
    let cam = Arc::new(SimulatedCamera::canon_eos());
    let (hardware, log) = serial_hardware();
    let mut camera = open(&cam, hardware);
    camera
        .start_exposure(ExposureRequest::from_secs_f64(3000.0))
        .unwrap();

    let started = Instant::now();
    camera.close();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        line_events(&log),
        vec![
            LineEvent::Open,
            LineEvent::Rts(true),
            LineEvent::Rts(false),
            LineEvent::Close
        ]
    );
}
