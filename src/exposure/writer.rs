//! Busy-tolerant configuration writes.

use crate::camera::{CameraBackend, Setting, WidgetValue};
use crate::error::{BackendError, ConfigError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Defines a policy for retrying a write the camera reported as busy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// The delay between attempts.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_delay: Duration::from_millis(500),
        }
    }
}

/// Writes configuration values to the camera, absorbing transient "busy" responses.
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct ConfigWriter {
    backend: Arc<dyn CameraBackend>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ConfigWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWriter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ConfigWriter {
    /// Create a writer over `backend`.
    pub fn new(backend: Arc<dyn CameraBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Read the current value of a widget, if the camera has it.
    pub fn current(&self, key: &str) -> Result<Option<WidgetValue>, BackendError> {
        Ok(self.backend.widget(key)?.map(|w| w.value))
    }

    /// Write and commit one value.
    ///
    /// Busy responses are retried up to `max_attempts` times with `backoff_delay` between
    /// attempts. Any other failure is returned immediately.
    pub fn write(&self, key: &str, value: Setting) -> Result<(), ConfigError> {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.backend.set(key, value.clone()) {
                Ok(()) => {
                    debug!(key, value = %value, attempt, "Wrote camera setting");
                    return Ok(());
                }
                Err(BackendError::Busy) => {
                    warn!(key, attempt, max_attempts = attempts, "Camera busy, retrying");
                    if attempt < attempts {
                        thread::sleep(self.policy.backoff_delay);
                    }
                }
                Err(BackendError::UnknownWidget(name)) => {
                    return Err(ConfigError::UnknownWidget(name));
                }
                Err(source) => {
                    return Err(ConfigError::Rejected {
                        key: key.to_string(),
                        source,
                    });
                }
            }
        }
        Err(ConfigError::Busy {
            key: key.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::{FaultScenario, SimulatedCamera};
    use std::time::Instant;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            backoff_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_write_succeeds_after_busy() {
        let cam = Arc::new(
            SimulatedCamera::canon_eos().with_fault(FaultScenario::BusyWrites { count: 3 }),
        );
        let writer = ConfigWriter::new(cam.clone(), fast_policy());
        writer.write("iso", Setting::Index(4)).unwrap();
        assert_eq!(cam.write_attempts(), 4);
        assert_eq!(cam.writes_to("iso"), vec![Setting::Index(4)]);
    }

    #[test]
    fn test_always_busy_is_attempted_max_times() {
        let cam = Arc::new(
            SimulatedCamera::canon_eos().with_fault(FaultScenario::BusyWrites { count: 100 }),
        );
        let writer = ConfigWriter::new(cam.clone(), RetryPolicy::default());
        let started = Instant::now();
        let err = writer.write("iso", Setting::Index(4)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Busy {
                key: "iso".into(),
                attempts: 5
            }
        );
        assert_eq!(cam.write_attempts(), 5);
        // four gaps of at least 500 ms between five attempts
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[test]
    fn test_non_busy_error_is_not_retried() {
        let cam = Arc::new(SimulatedCamera::canon_eos().with_fault(FaultScenario::RejectWrite {
            widget: "iso".into(),
        }));
        let writer = ConfigWriter::new(cam.clone(), fast_policy());
        let err = writer.write("iso", Setting::Index(4)).unwrap_err();
        assert!(matches!(err, ConfigError::Rejected { ref key, .. } if key == "iso"));
        assert_eq!(cam.write_attempts(), 1);
    }

    #[test]
    fn test_unknown_widget() {
        let cam = Arc::new(SimulatedCamera::new());
        let writer = ConfigWriter::new(cam, fast_policy());
        assert_eq!(
            writer.write("iso", Setting::Index(1)),
            Err(ConfigError::UnknownWidget("iso".into()))
        );
    }
}
