//! Exposure timer: the background watchdog that ends bulb exposures.
//!
//! One timer thread runs per open camera. It shares a single mailbox with the calling
//! thread, guarded by one mutex and one condition variable:
//!
//! ```text
//!  calling thread                          exposure-timer thread
//!  ──────────────                          ─────────────────────
//!  arm_bulb(d) ─┐                          ┌─ Idle: wait (coarse)
//!    start shutter                         │
//!    deadline = now + d                    ├─ StartBulb{deadline}
//!    StartBulb{deadline} ── notify ──────► │    remaining >= window: wait (coarse)
//!                                          │    remaining <  window: wait until deadline
//!  wait_for_completion() ◄── notify ────── │    now >= deadline: stop shutter, Done
//!                                          │
//!  arm_preset() ── StartPreset ─ notify ─► ├─ capture, Done
//!  shutdown() ──── Stop ──────── notify ─► └─ exit
//! ```
//!
//! The shutter strategy lives inside the mailbox, so every shutter operation happens with
//! the mailbox lock held and the timer can close the shutter without any other handle.

use super::shutter::{ShutterKind, ShutterStrategy};
use crate::camera::{CameraBackend, CameraFilePath};
use crate::error::{BackendError, ShutterError};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Wake-up intervals for the timer thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// Wake-up interval while idle or far from a deadline.
    pub coarse_wake: Duration,
    /// Below this much remaining time the timer sleeps exactly until the deadline.
    pub fine_window: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            coarse_wake: Duration::from_secs(5),
            fine_window: Duration::from_secs(5),
        }
    }
}

/// Command slot of the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Nothing in flight.
    Idle,
    /// A bulb exposure is open until `deadline`.
    StartBulb {
        /// When the shutter must close.
        deadline: Instant,
    },
    /// Take one preset exposure with the camera's own timing.
    StartPreset,
    /// Exit the timer thread.
    Stop,
}

/// How an armed exposure finished.
#[derive(Debug)]
pub enum Completion {
    /// The bulb deadline elapsed and the shutter was closed.
    ShutterClosed {
        /// When the close was issued.
        closed_at: Instant,
        /// Result of closing the shutter.
        result: Result<(), ShutterError>,
    },
    /// The preset capture returned.
    Captured(Result<CameraFilePath, BackendError>),
}

struct Mailbox {
    command: TimerCommand,
    completion: Option<Completion>,
    shutter: Option<Box<dyn ShutterStrategy>>,
}

struct Shared {
    mailbox: Mutex<Mailbox>,
    /// Each notification has one waiter: the timer thread for commands, the owning
    /// coordinator for completions.
    signal: Condvar,
}

/// Handle to the timer thread of one camera.
pub struct ExposureTimer {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    shutter_kind: Option<ShutterKind>,
    mirror_lock: bool,
}

impl fmt::Debug for ExposureTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposureTimer")
            .field("shutter_kind", &self.shutter_kind)
            .field("running", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl ExposureTimer {
    /// Start the timer thread. It owns `shutter` until the timer is shut down.
    pub fn spawn(
        backend: Arc<dyn CameraBackend>,
        shutter: Option<Box<dyn ShutterStrategy>>,
        config: TimerConfig,
    ) -> std::io::Result<Self> {
        let shutter_kind = shutter.as_ref().map(|s| s.kind());
        let mirror_lock = shutter.as_ref().is_some_and(|s| s.supports_mirror_lock());
        let shared = Arc::new(Shared {
            mailbox: Mutex::new(Mailbox {
                command: TimerCommand::Idle,
                completion: None,
                shutter,
            }),
            signal: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("exposure-timer".into())
            .spawn(move || run(thread_shared, backend, config))?;
        debug!("Exposure timer started");

        Ok(Self {
            shared,
            handle: Some(handle),
            shutter_kind,
            mirror_lock,
        })
    }

    /// Kind of the shutter strategy the timer owns.
    pub fn shutter_kind(&self) -> Option<ShutterKind> {
        self.shutter_kind
    }

    /// Whether the owned strategy can lock the mirror.
    pub fn supports_mirror_lock(&self) -> bool {
        self.mirror_lock
    }

    /// Current command slot.
    pub fn command(&self) -> TimerCommand {
        self.shared.mailbox.lock().command
    }

    /// Run the mirror-lock sequence of the owned strategy.
    pub fn mirror_lock(&self, delay: Duration) -> Result<(), ShutterError> {
        let mut mailbox = self.shared.mailbox.lock();
        match mailbox.shutter.as_mut() {
            Some(shutter) => shutter.mirror_lock(delay),
            None => Err(ShutterError::Device("no shutter release available".into())),
        }
    }

    /// Open the shutter and arm the deadline `duration` from now.
    ///
    /// The deadline is taken after the shutter has opened, so the exposure is never
    /// shorter than requested.
    pub fn arm_bulb(&self, duration: Duration) -> Result<Instant, ShutterError> {
        let mut mailbox = self.shared.mailbox.lock();
        let shutter = mailbox
            .shutter
            .as_mut()
            .ok_or_else(|| ShutterError::Device("no shutter release available".into()))?;
        shutter.start()?;
        let deadline = Instant::now() + duration;
        mailbox.completion = None;
        mailbox.command = TimerCommand::StartBulb { deadline };
        self.shared.signal.notify_one();
        Ok(deadline)
    }

    /// Ask the timer thread to take one preset exposure.
    pub fn arm_preset(&self) {
        let mut mailbox = self.shared.mailbox.lock();
        mailbox.completion = None;
        mailbox.command = TimerCommand::StartPreset;
        self.shared.signal.notify_one();
    }

    /// Block until the armed exposure completes, then return the mailbox to `Idle`.
    ///
    /// Returns `None` if nothing is armed or the timer is stopping.
    pub fn wait_for_completion(&self) -> Option<Completion> {
        let mut mailbox = self.shared.mailbox.lock();
        loop {
            if let Some(completion) = mailbox.completion.take() {
                mailbox.command = TimerCommand::Idle;
                return Some(completion);
            }
            if matches!(mailbox.command, TimerCommand::Idle | TimerCommand::Stop) {
                return None;
            }
            self.shared.signal.wait(&mut mailbox);
        }
    }

    /// Close the shutter if the owned strategy still holds it open.
    pub fn close_shutter_if_open(&self) -> Result<(), ShutterError> {
        let mut mailbox = self.shared.mailbox.lock();
        match mailbox.shutter.as_mut() {
            Some(shutter) if shutter.is_open() => {
                warn!(strategy = %shutter.kind(), "Closing shutter left open");
                shutter.stop()
            }
            _ => Ok(()),
        }
    }

    /// Stop and join the timer thread, closing the shutter if it is still open.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        {
            let mut mailbox = self.shared.mailbox.lock();
            mailbox.command = TimerCommand::Stop;
            self.shared.signal.notify_one();
        }
        if handle.join().is_err() {
            error!("Exposure timer thread panicked");
        }
        if let Err(e) = self.close_shutter_if_open() {
            error!(error = %e, "Failed to close shutter at shutdown");
        }
        debug!("Exposure timer stopped");
    }
}

impl Drop for ExposureTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<Shared>, backend: Arc<dyn CameraBackend>, config: TimerConfig) {
    let mut mailbox = shared.mailbox.lock();
    loop {
        let command = mailbox.command;
        match command {
            TimerCommand::Stop => break,
            TimerCommand::StartBulb { deadline } if mailbox.completion.is_none() => {
                let now = Instant::now();
                if now < deadline {
                    let remaining = deadline - now;
                    if remaining < config.fine_window {
                        shared.signal.wait_until(&mut mailbox, deadline);
                    } else {
                        shared
                            .signal
                            .wait_for(&mut mailbox, config.coarse_wake.min(remaining));
                    }
                    continue;
                }

                let closed_at = Instant::now();
                let result = match mailbox.shutter.as_mut() {
                    Some(shutter) => shutter.stop(),
                    None => Ok(()),
                };
                match &result {
                    Ok(()) => info!(
                        late_us = (closed_at - deadline).as_micros() as u64,
                        "Bulb deadline reached, shutter closed"
                    ),
                    Err(e) => error!(error = %e, "Failed to close shutter at deadline"),
                }
                mailbox.completion = Some(Completion::ShutterClosed { closed_at, result });
                shared.signal.notify_one();
            }
            TimerCommand::StartPreset if mailbox.completion.is_none() => {
                let result = backend.capture();
                if let Err(e) = &result {
                    error!(error = %e, "Preset capture failed");
                }
                mailbox.completion = Some(Completion::Captured(result));
                shared.signal.notify_one();
            }
            _ => {
                shared.signal.wait_for(&mut mailbox, config.coarse_wake);
            }
        }
    }
}
