//! Simulated camera backend.
//!
//! [`SimulatedCamera`] implements [`CameraBackend`] over an in-memory widget tree so the
//! exposure subsystem can be exercised without a camera body attached. It models the
//! parts of DSLR behavior the exposure code depends on:
//!
//! - widget writes are committed immediately and recorded for inspection
//! - closing a bulb control (`eosremoterelease` release-full, or `bulb=false` after
//!   `bulb=true`) queues `CaptureComplete` followed by `FileAdded`, unless mirror
//!   lockup is enabled and that cycle only raised the mirror
//! - `capture()` stores a new file and returns its path directly
//!
//! Failures are injected with [`FaultScenario`], in the same spirit as the mock drivers'
//! error scenarios.
//!
//! # Modes
//!
//! - [`MockMode::Instant`]: event waits return `Timeout` immediately when no event is
//!   queued, so retrieval timeouts are fast in unit tests
//! - [`MockMode::Realistic`]: event waits sleep for the requested timeout and captures
//!   take a short readout delay

use super::{
    CameraBackend, CameraEvent, CameraFilePath, ConfigTree, EventSource, FileInfo,
    FileTransfer, Setting, Widget, WidgetValue,
};
use crate::error::BackendError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::thread;
use std::time::Duration;
use tracing::debug;

const DCIM_FOLDER: &str = "/store_00010001/DCIM/100CANON";
const READOUT_DELAY: Duration = Duration::from_millis(50);

/// Operational modes for the simulated camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Camera-like timing - for integration tests and the CLI
    Realistic,
}

/// Injected failure for the simulated camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultScenario {
    /// The next `count` widget writes report busy.
    BusyWrites {
        /// Number of busy responses.
        count: u32,
    },
    /// Every write to this widget is rejected with a non-busy error.
    RejectWrite {
        /// Widget name.
        widget: String,
    },
    /// The next `count` event waits time out even if events are queued.
    EventTimeouts {
        /// Number of forced timeouts.
        count: u32,
    },
    /// Every delete fails.
    DeleteFails,
    /// Every single-shot capture fails.
    CaptureFails,
}

#[derive(Debug, Default)]
struct SimState {
    widgets: Vec<Widget>,
    writes: Vec<(String, Setting)>,
    write_attempts: u32,
    events: VecDeque<CameraEvent>,
    files: HashMap<CameraFilePath, Vec<u8>>,
    deleted: Vec<CameraFilePath>,
    next_file: u32,
    captures: u32,
    bulb_held: bool,
    mirror_lockup: bool,
    mirror_up: bool,
    busy_writes: u32,
    event_timeouts: u32,
    rejected: Vec<String>,
    delete_fails: bool,
    capture_fails: bool,
}

impl SimState {
    fn widget_mut(&mut self, name: &str) -> Option<&mut Widget> {
        self.widgets.iter_mut().find(|w| w.name == name)
    }

    fn upsert(&mut self, widget: Widget) {
        match self.widget_mut(&widget.name) {
            Some(existing) => *existing = widget,
            None => self.widgets.push(widget),
        }
    }

    fn file_extension(&self) -> &'static str {
        let format = self
            .widgets
            .iter()
            .find(|w| w.name == "imageformat")
            .and_then(|w| w.value.current_label().map(str::to_ascii_lowercase));
        match format {
            Some(label) if label.contains("jpeg") || label.contains("jpg") => "JPG",
            _ => "CR2",
        }
    }

    fn store_new_file(&mut self) -> CameraFilePath {
        self.next_file += 1;
        let path = CameraFilePath::new(
            DCIM_FOLDER,
            format!("IMG_{:04}.{}", self.next_file, self.file_extension()),
        );
        let payload = format!("simulated image {}", self.next_file).into_bytes();
        self.files.insert(path.clone(), payload);
        path
    }

    fn apply(&mut self, name: &str, value: &Setting) -> Result<(), BackendError> {
        let widget = self
            .widget_mut(name)
            .ok_or_else(|| BackendError::UnknownWidget(name.to_string()))?;
        if widget.readonly {
            return Err(BackendError::InvalidValue {
                widget: name.to_string(),
                reason: "widget is read-only".into(),
            });
        }
        let mismatch = |kind: &str| BackendError::InvalidValue {
            widget: name.to_string(),
            reason: format!("{} does not fit a {} widget", value, kind),
        };
        match (&mut widget.value, value) {
            (WidgetValue::Toggle(current), Setting::Toggle(v)) => *current = *v,
            (WidgetValue::Choice { current, choices }, Setting::Index(i)) => {
                if *i >= choices.len() {
                    return Err(BackendError::InvalidValue {
                        widget: name.to_string(),
                        reason: format!("choice {} out of range (0..{})", i, choices.len()),
                    });
                }
                *current = Some(*i);
            }
            (WidgetValue::Range { value: current, min, max, .. }, Setting::Number(n)) => {
                if *n < *min || *n > *max {
                    return Err(BackendError::InvalidValue {
                        widget: name.to_string(),
                        reason: format!("{} outside {}..={}", n, min, max),
                    });
                }
                *current = *n;
            }
            (WidgetValue::Text(current), Setting::Text(t)) => *current = t.clone(),
            (other, _) => return Err(mismatch(other.kind_name())),
        }
        Ok(())
    }

    /// Bulb controls produce a file when they are released.
    fn track_bulb(&mut self, name: &str, value: &Setting) {
        let released = match (name, value) {
            ("bulb", Setting::Toggle(true)) => {
                self.bulb_held = true;
                false
            }
            ("bulb", Setting::Toggle(false)) => true,
            ("eosremoterelease", Setting::Index(i)) => {
                let label = self
                    .widgets
                    .iter()
                    .find(|w| w.name == name)
                    .and_then(|w| w.value.choices().get(*i).cloned())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                if label.starts_with("press") {
                    self.bulb_held = true;
                    false
                } else {
                    label.starts_with("release")
                }
            }
            _ => false,
        };
        if released && self.bulb_held {
            self.bulb_held = false;
            // With mirror lockup enabled the first full press only raises the mirror.
            if self.mirror_lockup && !self.mirror_up {
                self.mirror_up = true;
                return;
            }
            self.mirror_up = false;
            let path = self.store_new_file();
            self.events.push_back(CameraEvent::CaptureComplete);
            self.events.push_back(CameraEvent::FileAdded(path));
        }
    }
}

/// In-memory camera used by tests and the CLI.
#[derive(Debug)]
pub struct SimulatedCamera {
    mode: MockMode,
    image_size: FileInfo,
    state: Mutex<SimState>,
}

fn choice(name: &str, labels: &[&str], current: usize) -> Widget {
    Widget {
        name: name.to_string(),
        label: name.to_string(),
        readonly: false,
        value: WidgetValue::Choice {
            current: if labels.is_empty() { None } else { Some(current) },
            choices: labels.iter().map(|s| s.to_string()).collect(),
        },
    }
}

fn text(name: &str, value: &str) -> Widget {
    Widget {
        name: name.to_string(),
        label: name.to_string(),
        readonly: true,
        value: WidgetValue::Text(value.to_string()),
    }
}

impl SimulatedCamera {
    /// Camera with an empty configuration tree.
    pub fn new() -> Self {
        Self {
            mode: MockMode::Instant,
            image_size: FileInfo {
                width: 5184,
                height: 3456,
            },
            state: Mutex::new(SimState::default()),
        }
    }

    /// A Canon EOS body with remote release, ISO, format and capture target widgets.
    pub fn canon_eos() -> Self {
        Self::new()
            .with_text("manufacturer", "Canon Inc.")
            .with_text("cameramodel", "Canon EOS 600D")
            .with_exposure_labels(&[
                "bulb", "30", "15", "8", "4", "2", "1", "1/2", "1/4", "1/15", "1/60", "1/250",
                "1/1000", "1/4000",
            ])
            .with_choice("iso", &["Auto", "100", "200", "400", "800", "1600", "3200"], 1)
            .with_choice("imageformat", &["Large Fine JPEG", "RAW", "RAW + Large Fine JPEG"], 1)
            .with_choice(
                "eosremoterelease",
                &[
                    "None",
                    "Press Half",
                    "Press Full",
                    "Release Half",
                    "Release Full",
                    "Immediate",
                ],
                0,
            )
            .with_choice("autoexposuremode", &["P", "TV", "AV", "Manual", "Bulb"], 3)
            .with_choice("capturetarget", &["Internal RAM", "Memory card"], 0)
            .with_toggle("viewfinder", false)
            .with_toggle("capture", false)
    }

    /// Select the timing mode.
    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Pixel dimensions reported for every file.
    pub fn with_image_size(mut self, width: u32, height: u32) -> Self {
        self.image_size = FileInfo { width, height };
        self
    }

    /// Add or replace a widget.
    pub fn with_widget(self, widget: Widget) -> Self {
        self.state.lock().upsert(widget);
        self
    }

    /// Add a choice widget with the given labels and current index.
    pub fn with_choice(self, name: &str, labels: &[&str], current: usize) -> Self {
        self.with_widget(choice(name, labels, current))
    }

    /// Add a toggle widget.
    pub fn with_toggle(self, name: &str, value: bool) -> Self {
        self.with_widget(Widget {
            name: name.to_string(),
            label: name.to_string(),
            readonly: false,
            value: WidgetValue::Toggle(value),
        })
    }

    /// Add a read-only text widget.
    pub fn with_text(self, name: &str, value: &str) -> Self {
        self.with_widget(text(name, value))
    }

    /// Add a `shutterspeed` widget with the given labels, currently at index 0.
    pub fn with_exposure_labels(self, labels: &[&str]) -> Self {
        self.with_choice("shutterspeed", labels, 0)
    }

    /// Set the camera model string.
    pub fn with_model(self, model: &str) -> Self {
        self.with_text("cameramodel", model)
    }

    /// Enable the mirror lockup custom function: every exposure then takes two full
    /// press/release cycles, the first raising the mirror and the second exposing.
    pub fn with_mirror_lockup(self) -> Self {
        self.state.lock().mirror_lockup = true;
        self
    }

    /// Whether the mirror is currently locked up.
    pub fn mirror_up(&self) -> bool {
        self.state.lock().mirror_up
    }

    /// Inject a failure.
    pub fn with_fault(self, fault: FaultScenario) -> Self {
        {
            let mut state = self.state.lock();
            match fault {
                FaultScenario::BusyWrites { count } => state.busy_writes += count,
                FaultScenario::RejectWrite { widget } => state.rejected.push(widget),
                FaultScenario::EventTimeouts { count } => state.event_timeouts += count,
                FaultScenario::DeleteFails => state.delete_fails = true,
                FaultScenario::CaptureFails => state.capture_fails = true,
            }
        }
        self
    }

    /// Store a new file and queue a `FileAdded` event for it, as the camera does when an
    /// external release cable ends an exposure.
    pub fn queue_file_added(&self) -> CameraFilePath {
        let mut state = self.state.lock();
        let path = state.store_new_file();
        state.events.push_back(CameraEvent::FileAdded(path.clone()));
        path
    }

    /// Queue an arbitrary event.
    pub fn queue_event(&self, event: CameraEvent) {
        self.state.lock().events.push_back(event);
    }

    /// Committed writes, in order.
    pub fn writes(&self) -> Vec<(String, Setting)> {
        self.state.lock().writes.clone()
    }

    /// Committed writes to one widget, in order.
    pub fn writes_to(&self, name: &str) -> Vec<Setting> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Number of write attempts, including busy and rejected ones.
    pub fn write_attempts(&self) -> u32 {
        self.state.lock().write_attempts
    }

    /// Current value of a widget.
    pub fn value(&self, name: &str) -> Option<WidgetValue> {
        self.state
            .lock()
            .widgets
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.value.clone())
    }

    /// Files deleted from camera storage.
    pub fn deleted(&self) -> Vec<CameraFilePath> {
        self.state.lock().deleted.clone()
    }

    /// Number of single-shot captures taken.
    pub fn captures(&self) -> u32 {
        self.state.lock().captures
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTree for SimulatedCamera {
    fn widget(&self, name: &str) -> Result<Option<Widget>, BackendError> {
        Ok(self
            .state
            .lock()
            .widgets
            .iter()
            .find(|w| w.name == name)
            .cloned())
    }

    fn set(&self, name: &str, value: Setting) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.write_attempts += 1;
        if state.busy_writes > 0 {
            state.busy_writes -= 1;
            return Err(BackendError::Busy);
        }
        if state.rejected.iter().any(|w| w == name) {
            return Err(BackendError::Other(format!("I/O in progress on '{}'", name)));
        }
        state.apply(name, &value)?;
        debug!(widget = name, value = %value, "Simulated camera committed write");
        state.track_bulb(name, &value);
        state.writes.push((name.to_string(), value));
        Ok(())
    }

    fn widget_names(&self) -> Result<Vec<String>, BackendError> {
        Ok(self
            .state
            .lock()
            .widgets
            .iter()
            .map(|w| w.name.clone())
            .collect())
    }
}

impl EventSource for SimulatedCamera {
    fn wait_for_event(&self, timeout: Duration) -> Result<CameraEvent, BackendError> {
        let event = {
            let mut state = self.state.lock();
            if state.event_timeouts > 0 {
                state.event_timeouts -= 1;
                None
            } else {
                state.events.pop_front()
            }
        };
        match event {
            Some(event) => Ok(event),
            None => {
                if self.mode == MockMode::Realistic {
                    thread::sleep(timeout);
                }
                Ok(CameraEvent::Timeout)
            }
        }
    }
}

impl FileTransfer for SimulatedCamera {
    fn download(&self, path: &CameraFilePath) -> Result<Vec<u8>, BackendError> {
        self.state
            .lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::Io(format!("no such file {}", path)))
    }

    fn file_info(&self, path: &CameraFilePath) -> Result<FileInfo, BackendError> {
        if self.state.lock().files.contains_key(path) {
            Ok(self.image_size)
        } else {
            Err(BackendError::Io(format!("no such file {}", path)))
        }
    }

    fn delete(&self, path: &CameraFilePath) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.delete_fails {
            return Err(BackendError::Other("delete not permitted".into()));
        }
        state
            .files
            .remove(path)
            .ok_or_else(|| BackendError::Io(format!("no such file {}", path)))?;
        state.deleted.push(path.clone());
        Ok(())
    }
}

impl CameraBackend for SimulatedCamera {
    fn capture(&self) -> Result<CameraFilePath, BackendError> {
        if self.mode == MockMode::Realistic {
            thread::sleep(READOUT_DELAY);
        }
        let mut state = self.state.lock();
        if state.capture_fails {
            return Err(BackendError::Other("capture failed".into()));
        }
        state.captures += 1;
        Ok(state.store_new_file())
    }
}
