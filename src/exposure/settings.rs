//! Camera capability discovery.
//!
//! [`SettingsResolver`] runs once when a camera is opened. It reads the configuration
//! tree, parses the firmware's shutter-speed vocabulary into a [`ShutterSpeedTable`], and
//! records which widgets the exposure path can drive. The result,
//! [`CameraCapabilities`], is read-only for the rest of the session.
//!
//! Shutter-speed labels are heterogeneous across firmwares: `"1/500"`, `"2.5"`, `"30"`,
//! `"Bulb"`, and on some bodies the sentinel `"65535/65535"` for bulb.

use crate::camera::{ConfigTree, WidgetValue};
use crate::error::{BackendError, ExposureError};
use tracing::{debug, info, warn};

/// Exposure widgets, in lookup order.
const EXPOSURE_WIDGETS: [&str; 3] = ["shutterspeed2", "shutterspeed", "eos-shutterspeed"];
const ISO_WIDGETS: [&str; 2] = ["iso", "eos-iso"];
const FORMAT_WIDGET: &str = "imageformat";
const REMOTE_RELEASE_WIDGET: &str = "eosremoterelease";
const BULB_WIDGET: &str = "bulb";
const AUTO_EXPOSURE_WIDGET: &str = "autoexposuremode";
const CAPTURE_TARGET_WIDGET: &str = "capturetarget";
const VIEWFINDER_WIDGET: &str = "viewfinder";
pub(crate) const CAPTURE_TOGGLE_WIDGET: &str = "capture";
const MANUFACTURER_WIDGETS: [&str; 1] = ["manufacturer"];
const MODEL_WIDGETS: [&str; 2] = ["cameramodel", "model"];

/// Sentinel some firmwares report instead of a "bulb" label.
const BULB_SENTINEL: &str = "65535/65535";

/// Remote-release choice indices used when the labels are not recognizable.
const EOS_PRESS_FULL: usize = 2;
const EOS_RELEASE_FULL: usize = 4;

/// Preset tables with more entries than this are offered as quick-exposure choices.
const QUICK_PRESET_THRESHOLD: usize = 4;

/// Default lower exposure bound in seconds.
pub const DEFAULT_MIN_EXPOSURE: f64 = 0.001;
/// Default upper exposure bound in seconds.
pub const DEFAULT_MAX_EXPOSURE: f64 = 3600.0;

/// Parsed value of one shutter-speed label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShutterSpeed {
    /// A timed preset, in seconds. Always strictly positive.
    Seconds(f64),
    /// The bulb preset.
    Bulb,
    /// A label this parser does not understand.
    Unknown,
}

impl ShutterSpeed {
    /// Duration in seconds for timed presets.
    pub fn seconds(&self) -> Option<f64> {
        match self {
            ShutterSpeed::Seconds(s) => Some(*s),
            _ => None,
        }
    }
}

/// One entry of the camera's exposure-preset table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposurePreset {
    /// Label as reported by the camera.
    pub label: String,
    /// Parsed value.
    pub speed: ShutterSpeed,
}

/// Parse the leading integer of `s`, the way `%d` would.
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .last()
        .map(|(i, c)| i + c.len_utf8())?;
    s[..end].parse().ok()
}

/// Parse the leading decimal number of `s`, ignoring trailing units like `s` or `"`.
fn leading_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    let mut seen_dot = false;
    let mut end = 0;
    for (i, c) in s.char_indices() {
        let accept = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (c == '.' && !std::mem::replace(&mut seen_dot, true));
        if !accept {
            break;
        }
        end = i + c.len_utf8();
    }
    s[..end].parse().ok()
}

/// Parse a single shutter-speed label.
///
/// ```
/// use dslr_capture::exposure::{parse_shutter_speed, ShutterSpeed};
///
/// assert_eq!(parse_shutter_speed("1/500"), ShutterSpeed::Seconds(0.002));
/// assert_eq!(parse_shutter_speed("BULB"), ShutterSpeed::Bulb);
/// assert_eq!(parse_shutter_speed("2.5"), ShutterSpeed::Seconds(2.5));
/// assert_eq!(parse_shutter_speed("garbage"), ShutterSpeed::Unknown);
/// ```
pub fn parse_shutter_speed(label: &str) -> ShutterSpeed {
    let trimmed = label.trim();
    if trimmed.eq_ignore_ascii_case("bulb") || trimmed == BULB_SENTINEL {
        return ShutterSpeed::Bulb;
    }

    let seconds = match trimmed.split_once('/') {
        Some((num, denom)) => match (leading_int(num), leading_int(denom)) {
            (Some(n), Some(d)) if d != 0 => Some(n as f64 / d as f64),
            _ => None,
        },
        None => leading_decimal(trimmed),
    };

    match seconds {
        Some(s) if s > 0.0 && s.is_finite() => ShutterSpeed::Seconds(s),
        _ => ShutterSpeed::Unknown,
    }
}

/// Parsed exposure-preset table with its derived limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutterSpeedTable {
    presets: Vec<ExposurePreset>,
    bulb_index: Option<usize>,
    min_exposure: f64,
    max_exposure: f64,
}

impl ShutterSpeedTable {
    /// Parse a list of labels.
    ///
    /// `max_exposure` starts at `default_max` and grows with the largest timed preset.
    /// `min_exposure` is the smallest timed preset, or `default_min` when there is none.
    /// Fails with [`ExposureError::NoExposureWidget`] when no label is usable.
    pub fn parse<S: AsRef<str>>(
        labels: &[S],
        default_min: f64,
        default_max: f64,
    ) -> Result<Self, ExposureError> {
        let mut presets = Vec::with_capacity(labels.len());
        let mut bulb_index = None;
        let mut max_exposure = default_max;
        let mut min_positive: Option<f64> = None;

        for (i, label) in labels.iter().enumerate() {
            let label = label.as_ref();
            let speed = parse_shutter_speed(label);
            match speed {
                ShutterSpeed::Bulb => bulb_index = Some(i),
                ShutterSpeed::Seconds(s) => {
                    if s > max_exposure {
                        max_exposure = s;
                    }
                    if min_positive.map_or(true, |m| s < m) {
                        min_positive = Some(s);
                    }
                }
                ShutterSpeed::Unknown => debug!(label, "Unrecognized shutter speed label"),
            }
            presets.push(ExposurePreset {
                label: label.to_string(),
                speed,
            });
        }

        if bulb_index.is_none() && min_positive.is_none() {
            return Err(ExposureError::NoExposureWidget);
        }

        Ok(Self {
            presets,
            bulb_index,
            min_exposure: min_positive.unwrap_or(default_min),
            max_exposure,
        })
    }

    /// All entries in camera order, including bulb and unknown ones.
    pub fn presets(&self) -> &[ExposurePreset] {
        &self.presets
    }

    /// Index of the bulb preset, if the camera reported one.
    pub fn bulb_index(&self) -> Option<usize> {
        self.bulb_index
    }

    /// Smallest timed preset in seconds.
    pub fn min_exposure(&self) -> f64 {
        self.min_exposure
    }

    /// Largest exposure in seconds.
    pub fn max_exposure(&self) -> f64 {
        self.max_exposure
    }

    /// Index of the timed preset closest to `seconds`.
    ///
    /// Linear scan with a strict less-than, so on an exact tie the earliest index wins.
    /// Returns `None` when the table has no timed presets.
    pub fn nearest(&self, seconds: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, preset) in self.presets.iter().enumerate() {
            let Some(value) = preset.speed.seconds() else {
                continue;
            };
            let delta = (seconds - value).abs();
            if best.map_or(true, |(_, best_delta)| delta < best_delta) {
                best = Some((i, delta));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Labels offered as quick-exposure choices, when the table is large enough.
    pub fn quick_presets(&self) -> Vec<String> {
        if self.presets.len() > QUICK_PRESET_THRESHOLD {
            self.presets.iter().map(|p| p.label.clone()).collect()
        } else {
            Vec::new()
        }
    }
}

/// How the camera's exposure time is selected.
#[derive(Debug, Clone, PartialEq)]
pub enum ExposureControl {
    /// A choice widget with a parsed preset table.
    Presets {
        /// Widget name.
        widget: String,
        /// Parsed table.
        table: ShutterSpeedTable,
    },
    /// An exposure widget exists but offers no usable presets; only bulb is possible.
    Unlisted {
        /// Widget name.
        widget: String,
    },
}

impl ExposureControl {
    /// Name of the exposure widget.
    pub fn widget(&self) -> &str {
        match self {
            ExposureControl::Presets { widget, .. } | ExposureControl::Unlisted { widget } => {
                widget
            }
        }
    }

    /// The preset table, when one exists.
    pub fn table(&self) -> Option<&ShutterSpeedTable> {
        match self {
            ExposureControl::Presets { table, .. } => Some(table),
            ExposureControl::Unlisted { .. } => None,
        }
    }
}

/// Capability tag for the camera's own bulb control, resolved once at open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulbControl {
    /// Canon-style remote release menu driven by press/release choices.
    RemoteRelease {
        /// Widget name.
        widget: String,
        /// Choice index that fully presses the shutter button.
        press_full: usize,
        /// Choice index that fully releases it.
        release_full: usize,
    },
    /// A boolean bulb toggle.
    Toggle {
        /// Widget name.
        widget: String,
    },
}

impl BulbControl {
    /// Name of the bulb widget.
    pub fn widget(&self) -> &str {
        match self {
            BulbControl::RemoteRelease { widget, .. } | BulbControl::Toggle { widget } => widget,
        }
    }
}

/// A discrete choice setting such as ISO or image format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceSetting {
    /// Widget name.
    pub widget: String,
    /// Choice labels.
    pub choices: Vec<String>,
    /// Index selected when the camera was opened.
    pub current: Option<usize>,
}

/// Everything the exposure path needs to know about a camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCapabilities {
    /// Exposure selection, if any exposure control was found.
    pub exposure: Option<ExposureControl>,
    /// Internal bulb control, if any.
    pub bulb_control: Option<BulbControl>,
    /// ISO setting.
    pub iso: Option<ChoiceSetting>,
    /// Image format setting.
    pub format: Option<ChoiceSetting>,
    /// Auto-exposure mode widget name.
    pub auto_exposure_mode: Option<String>,
    /// Capture target widget name.
    pub capture_target: Option<String>,
    /// Viewfinder toggle widget name.
    pub viewfinder: Option<String>,
    /// Whether a Canon-style `capture` toggle exists.
    pub has_capture_toggle: bool,
    /// Camera manufacturer.
    pub manufacturer: Option<String>,
    /// Camera model.
    pub model: Option<String>,
    /// Smallest supported exposure in seconds.
    pub min_exposure: f64,
    /// Largest supported exposure in seconds.
    pub max_exposure: f64,
    /// Whether a serial bulb cable is configured.
    pub has_serial_bulb_port: bool,
    /// Whether a USB shutter release device was detected.
    pub has_usb_shutter_release: bool,
}

impl CameraCapabilities {
    /// The preset table, if the exposure control has one.
    pub fn preset_table(&self) -> Option<&ShutterSpeedTable> {
        self.exposure.as_ref().and_then(ExposureControl::table)
    }

    /// Index of the bulb preset.
    pub fn bulb_preset_index(&self) -> Option<usize> {
        self.preset_table().and_then(ShutterSpeedTable::bulb_index)
    }

    /// Whether the camera has its own bulb widget.
    pub fn has_bulb_widget(&self) -> bool {
        self.bulb_control.is_some()
    }

    /// Whether the capture target can be queried and changed.
    pub fn capture_target_supported(&self) -> bool {
        self.capture_target.is_some()
    }

    /// Labels offered as quick-exposure choices.
    pub fn quick_presets(&self) -> Vec<String> {
        self.preset_table()
            .map(ShutterSpeedTable::quick_presets)
            .unwrap_or_default()
    }
}

/// Builds [`CameraCapabilities`] from a camera configuration tree.
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    default_min: f64,
    default_max: f64,
}

impl Default for SettingsResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_EXPOSURE, DEFAULT_MAX_EXPOSURE)
    }
}

impl SettingsResolver {
    /// Resolver seeded with the given exposure limits, in seconds.
    pub fn new(default_min: f64, default_max: f64) -> Self {
        Self {
            default_min,
            default_max,
        }
    }

    /// Read the configuration tree and build the capability record.
    pub fn resolve(&self, tree: &dyn ConfigTree) -> Result<CameraCapabilities, BackendError> {
        let exposure = self.resolve_exposure(tree)?;
        let (min_exposure, max_exposure) = exposure
            .as_ref()
            .and_then(ExposureControl::table)
            .map(|t| (t.min_exposure(), t.max_exposure()))
            .unwrap_or((self.default_min, self.default_max));

        let caps = CameraCapabilities {
            exposure,
            bulb_control: resolve_bulb_control(tree)?,
            iso: resolve_choice(tree, &ISO_WIDGETS)?,
            format: resolve_choice(tree, &[FORMAT_WIDGET])?,
            auto_exposure_mode: existing(tree, &[AUTO_EXPOSURE_WIDGET])?,
            capture_target: existing(tree, &[CAPTURE_TARGET_WIDGET])?,
            viewfinder: existing(tree, &[VIEWFINDER_WIDGET])?,
            has_capture_toggle: tree.widget(CAPTURE_TOGGLE_WIDGET)?.is_some(),
            manufacturer: read_text(tree, &MANUFACTURER_WIDGETS)?,
            model: read_text(tree, &MODEL_WIDGETS)?,
            min_exposure,
            max_exposure,
            has_serial_bulb_port: false,
            has_usb_shutter_release: false,
        };

        info!(
            exposure = caps.exposure.as_ref().map(ExposureControl::widget),
            bulb = caps.bulb_control.as_ref().map(BulbControl::widget),
            min_exposure = caps.min_exposure,
            max_exposure = caps.max_exposure,
            model = caps.model.as_deref(),
            "Resolved camera capabilities"
        );
        Ok(caps)
    }

    fn resolve_exposure(
        &self,
        tree: &dyn ConfigTree,
    ) -> Result<Option<ExposureControl>, BackendError> {
        for name in EXPOSURE_WIDGETS {
            let Some(widget) = tree.widget(name)? else {
                continue;
            };
            let choices = widget.value.choices();
            return Ok(Some(
                match ShutterSpeedTable::parse(choices, self.default_min, self.default_max) {
                    Ok(table) => ExposureControl::Presets {
                        widget: widget.name,
                        table,
                    },
                    Err(_) => {
                        warn!(
                            widget = %widget.name,
                            choices = choices.len(),
                            "Exposure widget has no usable presets, only bulb exposures are possible"
                        );
                        ExposureControl::Unlisted {
                            widget: widget.name,
                        }
                    }
                },
            ));
        }

        // Some bodies only expose the capture target; drive it as a two-entry table.
        if tree.widget(CAPTURE_TARGET_WIDGET)?.is_some() {
            debug!("No shutter speed widget, falling back to capture target");
            if let Ok(table) =
                ShutterSpeedTable::parse(&["1/1", "bulb"], self.default_min, self.default_max)
            {
                return Ok(Some(ExposureControl::Presets {
                    widget: CAPTURE_TARGET_WIDGET.to_string(),
                    table,
                }));
            }
        }

        warn!("No exposure widget found");
        Ok(None)
    }
}

fn existing(tree: &dyn ConfigTree, names: &[&str]) -> Result<Option<String>, BackendError> {
    for name in names {
        if let Some(widget) = tree.widget(name)? {
            return Ok(Some(widget.name));
        }
    }
    Ok(None)
}

fn read_text(tree: &dyn ConfigTree, names: &[&str]) -> Result<Option<String>, BackendError> {
    for name in names {
        if let Some(widget) = tree.widget(name)? {
            if let WidgetValue::Text(value) = widget.value {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

fn resolve_choice(
    tree: &dyn ConfigTree,
    names: &[&str],
) -> Result<Option<ChoiceSetting>, BackendError> {
    for name in names {
        if let Some(widget) = tree.widget(name)? {
            if let WidgetValue::Choice { current, choices } = widget.value {
                return Ok(Some(ChoiceSetting {
                    widget: widget.name,
                    choices,
                    current,
                }));
            }
        }
    }
    Ok(None)
}

fn find_label(choices: &[String], label: &str) -> Option<usize> {
    choices.iter().position(|c| c.trim().eq_ignore_ascii_case(label))
}

fn resolve_bulb_control(tree: &dyn ConfigTree) -> Result<Option<BulbControl>, BackendError> {
    if let Some(widget) = tree.widget(REMOTE_RELEASE_WIDGET)? {
        let choices = widget.value.choices();
        return Ok(Some(BulbControl::RemoteRelease {
            press_full: find_label(choices, "Press Full").unwrap_or(EOS_PRESS_FULL),
            release_full: find_label(choices, "Release Full").unwrap_or(EOS_RELEASE_FULL),
            widget: widget.name,
        }));
    }
    if let Some(widget) = tree.widget(BULB_WIDGET)? {
        return Ok(Some(BulbControl::Toggle {
            widget: widget.name,
        }));
    }
    Ok(None)
}
