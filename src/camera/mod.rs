//! Camera Control Capabilities
//!
//! The exposure subsystem never talks to a camera body directly. It consumes three
//! narrow capabilities provided by an external camera control layer (for a real DSLR this
//! is a gphoto-style library; for tests and the CLI it is [`mock::SimulatedCamera`]):
//!
//! - [`ConfigTree`]: named, typed configuration widgets (read and commit)
//! - [`EventSource`]: blocking wait for the next camera event
//! - [`FileTransfer`]: download, inspect and delete files in camera storage
//!
//! [`CameraBackend`] bundles the three with the single-shot capture command. The
//! exposure code holds it as `Arc<dyn CameraBackend>` so the calling thread and the
//! timer thread can share one handle.
//!
//! # Thread Safety
//! All traits require `Send + Sync`. Implementations are expected to serialize access to
//! the underlying device themselves.

pub mod mock;

use crate::error::BackendError;
use std::fmt;
use std::time::Duration;

/// Typed value held by a configuration widget.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetValue {
    /// Free text.
    Text(String),
    /// Numeric range with its bounds and step.
    Range {
        /// Current value.
        value: f32,
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
        /// Increment.
        step: f32,
    },
    /// Boolean toggle.
    Toggle(bool),
    /// Radio button or menu with indexed string choices.
    Choice {
        /// Index of the current choice, if the current value is one of `choices`.
        current: Option<usize>,
        /// Choice labels in camera order.
        choices: Vec<String>,
    },
    /// Date as seconds since the Unix epoch.
    Date(i64),
}

impl WidgetValue {
    /// Choice labels, or an empty slice for non-choice widgets.
    pub fn choices(&self) -> &[String] {
        match self {
            WidgetValue::Choice { choices, .. } => choices,
            _ => &[],
        }
    }

    /// Index of the current choice for choice widgets.
    pub fn current_index(&self) -> Option<usize> {
        match self {
            WidgetValue::Choice { current, .. } => *current,
            _ => None,
        }
    }

    /// Label of the current choice for choice widgets.
    pub fn current_label(&self) -> Option<&str> {
        match self {
            WidgetValue::Choice { current, choices } => {
                current.and_then(|i| choices.get(i)).map(String::as_str)
            }
            _ => None,
        }
    }

    /// Short name of the widget kind, for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            WidgetValue::Text(_) => "text",
            WidgetValue::Range { .. } => "range",
            WidgetValue::Toggle(_) => "toggle",
            WidgetValue::Choice { .. } => "choice",
            WidgetValue::Date(_) => "date",
        }
    }
}

/// A named widget from the camera configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    /// Widget name (e.g. `shutterspeed`, `iso`).
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Whether the camera refuses writes to this widget.
    pub readonly: bool,
    /// Value at the time the widget was read.
    pub value: WidgetValue,
}

/// A value to write into a widget.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    /// Set a toggle widget.
    Toggle(bool),
    /// Select a choice by index (radio/menu widgets).
    Index(usize),
    /// Set a numeric range widget.
    Number(f32),
    /// Set a text widget.
    Text(String),
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Toggle(v) => write!(f, "{}", v),
            Setting::Index(i) => write!(f, "#{}", i),
            Setting::Number(n) => write!(f, "{}", n),
            Setting::Text(t) => write!(f, "'{}'", t),
        }
    }
}

/// Location of a file in camera storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraFilePath {
    /// Folder on the camera (e.g. `/store_00010001/DCIM/100CANON`).
    pub folder: String,
    /// File name within the folder.
    pub name: String,
}

impl CameraFilePath {
    /// Create a path from folder and name.
    pub fn new(folder: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CameraFilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder.trim_end_matches('/'), self.name)
    }
}

/// Pixel dimensions reported for a camera file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Event reported by the camera event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
    /// The camera finished a capture; the file may not be available yet.
    CaptureComplete,
    /// A new file is available in camera storage.
    FileAdded(CameraFilePath),
    /// An event kind this subsystem does not handle.
    Unknown(String),
    /// Nothing happened within the requested timeout.
    Timeout,
}

/// Capability: camera configuration tree.
///
/// # Contract
/// - `widget` returns `Ok(None)` when the camera has no widget of that name
/// - `set` commits the value to the camera immediately; a transient contention is
///   reported as [`BackendError::Busy`]
pub trait ConfigTree: Send + Sync {
    /// Look up a widget by name and read its current value.
    fn widget(&self, name: &str) -> Result<Option<Widget>, BackendError>;

    /// Write and commit a value.
    fn set(&self, name: &str, value: Setting) -> Result<(), BackendError>;

    /// Names of every widget in the tree, in tree order.
    fn widget_names(&self) -> Result<Vec<String>, BackendError>;
}

/// Capability: camera event stream.
pub trait EventSource: Send + Sync {
    /// Block for at most `timeout` waiting for the next event.
    fn wait_for_event(&self, timeout: Duration) -> Result<CameraEvent, BackendError>;
}

/// Capability: access to files in camera storage.
pub trait FileTransfer: Send + Sync {
    /// Download the complete file contents.
    fn download(&self, path: &CameraFilePath) -> Result<Vec<u8>, BackendError>;

    /// Pixel dimensions of an image file.
    fn file_info(&self, path: &CameraFilePath) -> Result<FileInfo, BackendError>;

    /// Remove a file from camera storage.
    fn delete(&self, path: &CameraFilePath) -> Result<(), BackendError>;
}

/// A complete camera control backend.
pub trait CameraBackend: ConfigTree + EventSource + FileTransfer {
    /// Take one exposure using the camera's own shutter timing and return the file it
    /// produced.
    fn capture(&self) -> Result<CameraFilePath, BackendError>;
}
