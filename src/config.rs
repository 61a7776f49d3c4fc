//! Configuration loading using Figment.
//!
//! Configuration is merged from:
//! 1. `config/camera.toml` (base configuration, optional)
//! 2. Environment variables prefixed with `DSLR_CAPTURE_`, with `__` separating
//!    nested keys
//!
//! Every section and key has a default, so an empty or missing file yields a working
//! configuration.
//!
//! # Example
//! ```no_run
//! use dslr_capture::config::AppConfig;
//!
//! // DSLR_CAPTURE_TIMING__COARSE_WAKE_MS=1000 overrides timing.coarse_wake_ms
//! let config = AppConfig::load()?;
//! config.validate().map_err(|e| anyhow::anyhow!(e))?;
//! println!("Shutter release: {:?}", config.shutter_release.kind);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::exposure::settings::{DEFAULT_MAX_EXPOSURE, DEFAULT_MIN_EXPOSURE};
use crate::exposure::{
    CaptureTarget, OpenOptions, RetrievalPolicy, RetryPolicy, ShutterTiming, TimerConfig,
};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/camera.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DSLR_CAPTURE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// External shutter release hardware
    #[serde(default)]
    pub shutter_release: ShutterReleaseConfig,
    /// Retry, polling and timer intervals
    #[serde(default)]
    pub timing: TimingConfig,
    /// Camera-specific behavior
    #[serde(default)]
    pub camera: CameraConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Which external shutter release to use for bulb exposures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutterReleaseKind {
    /// Use the camera's own bulb control.
    #[default]
    None,
    /// RTS-keyed serial cable on `port`.
    Serial,
    /// DSUSB release device.
    Usb,
}

/// External shutter release configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutterReleaseConfig {
    /// Release hardware kind
    #[serde(default)]
    pub kind: ShutterReleaseKind,
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3")
    #[serde(default)]
    pub port: Option<String>,
}

/// Timing configuration, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Attempts per setting write while the camera reports busy
    #[serde(default = "default_retry_attempts")]
    pub config_retry_attempts: u32,
    /// Delay between busy retries
    #[serde(default = "default_retry_delay")]
    pub config_retry_delay_ms: u64,
    /// Timeout of each event wait while polling for a bulb image
    #[serde(default = "default_event_timeout")]
    pub event_timeout_ms: u64,
    /// Event timeouts tolerated before image retrieval fails
    #[serde(default = "default_max_event_timeouts")]
    pub max_event_timeouts: u32,
    /// Timer wake-up interval far from a deadline
    #[serde(default = "default_coarse_wake")]
    pub coarse_wake_ms: u64,
    /// Remaining time below which the timer waits for the exact deadline
    #[serde(default = "default_fine_window")]
    pub fine_window_ms: u64,
    /// Delay between USB release command phases
    #[serde(default = "default_usb_phase_delay")]
    pub usb_phase_delay_ms: u64,
    /// Serial RTS pulse length for mirror lock
    #[serde(default = "default_serial_mirror_pulse")]
    pub serial_mirror_pulse_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            config_retry_attempts: default_retry_attempts(),
            config_retry_delay_ms: default_retry_delay(),
            event_timeout_ms: default_event_timeout(),
            max_event_timeouts: default_max_event_timeouts(),
            coarse_wake_ms: default_coarse_wake(),
            fine_window_ms: default_fine_window(),
            usb_phase_delay_ms: default_usb_phase_delay(),
            serial_mirror_pulse_ms: default_serial_mirror_pulse(),
        }
    }
}

/// Camera behavior configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Lower exposure bound in seconds when the camera reports no timed presets
    #[serde(default = "default_min_exposure")]
    pub default_min_exposure: f64,
    /// Upper exposure bound in seconds, raised by longer camera presets
    #[serde(default = "default_max_exposure")]
    pub default_max_exposure: f64,
    /// Camera model substrings on which downloaded files are kept on the camera
    #[serde(default = "default_delete_exceptions")]
    pub delete_exceptions: Vec<String>,
    /// Capture target to select when the camera is opened
    #[serde(default)]
    pub capture_target: Option<CaptureTarget>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            default_min_exposure: default_min_exposure(),
            default_max_exposure: default_max_exposure(),
            delete_exceptions: default_delete_exceptions(),
            capture_target: None,
        }
    }
}

// Default value functions
fn default_name() -> String {
    "dslr_capture".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    500
}

fn default_event_timeout() -> u64 {
    1000
}

fn default_max_event_timeouts() -> u32 {
    10
}

fn default_coarse_wake() -> u64 {
    5000
}

fn default_fine_window() -> u64 {
    5000
}

fn default_usb_phase_delay() -> u64 {
    100
}

fn default_serial_mirror_pulse() -> u64 {
    20
}

fn default_min_exposure() -> f64 {
    DEFAULT_MIN_EXPOSURE
}

fn default_max_exposure() -> f64 {
    DEFAULT_MAX_EXPOSURE
}

fn default_delete_exceptions() -> Vec<String> {
    vec!["20D".to_string()]
}

impl AppConfig {
    /// Load configuration from `config/camera.toml` and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if self.timing.config_retry_attempts == 0 {
            return Err("config_retry_attempts must be at least 1".to_string());
        }

        if self.timing.max_event_timeouts == 0 {
            return Err("max_event_timeouts must be at least 1".to_string());
        }

        if self.shutter_release.kind == ShutterReleaseKind::Serial
            && self
                .shutter_release
                .port
                .as_deref()
                .map_or(true, |p| p.trim().is_empty())
        {
            return Err("Serial shutter release requires a port".to_string());
        }

        let (min, max) = (
            self.camera.default_min_exposure,
            self.camera.default_max_exposure,
        );
        if !(min > 0.0 && min < max) {
            return Err(format!(
                "Invalid exposure range: default_min_exposure {min} must be positive and below default_max_exposure {max}"
            ));
        }

        Ok(())
    }

    /// Options for opening a camera with this configuration.
    pub fn open_options(&self) -> OpenOptions {
        let t = &self.timing;
        OpenOptions {
            retry: RetryPolicy {
                max_attempts: t.config_retry_attempts,
                backoff_delay: Duration::from_millis(t.config_retry_delay_ms),
            },
            timer: TimerConfig {
                coarse_wake: Duration::from_millis(t.coarse_wake_ms),
                fine_window: Duration::from_millis(t.fine_window_ms),
            },
            shutter_timing: ShutterTiming {
                usb_phase_delay: Duration::from_millis(t.usb_phase_delay_ms),
                serial_mirror_pulse: Duration::from_millis(t.serial_mirror_pulse_ms),
            },
            retrieval: RetrievalPolicy {
                event_timeout: Duration::from_millis(t.event_timeout_ms),
                max_timeouts: t.max_event_timeouts,
            },
            default_min_exposure: self.camera.default_min_exposure,
            default_max_exposure: self.camera.default_max_exposure,
            delete_exceptions: self.camera.delete_exceptions.clone(),
            capture_target: self.camera.capture_target,
            shutter_release: self.shutter_release.clone(),
        }
    }
}
