//! Debounced screenshot scheduling.
//!
//! Geometry and viewport changes arrive in bursts while a page reflows.
//! Each [`ScreenshotScheduler::signal`] call replaces the pending capture
//! deadline, so only the last signal of a burst produces an actual
//! capture. The pending slot lives inside a single scheduler thread and
//! deadline replacement is a plain assignment, so there is no
//! cancel/replace race and nothing to double-cancel.
//!
//! Capture failures never abort a session: they are logged and the
//! scheduler keeps running.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use super::ScreenSource;
use crate::events::{ImageCapture, Region, SessionEvent};
use crate::timeline::SessionTimeline;

/// Default debounce window for geometry-driven capture signals.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Short delay used for explicitly requested captures.
pub const QUICK_DELAY: Duration = Duration::from_millis(100);

enum SchedulerCommand {
    Signal { delay: Duration },
    Attach { timeline: Arc<SessionTimeline>, dir: PathBuf },
    Detach,
    Cancel,
}

/// Debounced single-slot screen capture scheduler.
///
/// Inert until a session timeline is attached; signals received while
/// detached are dropped, which is also how fake-replay sessions keep the
/// scheduler disabled.
pub struct ScreenshotScheduler {
    commands: Sender<SchedulerCommand>,
    worker: Option<JoinHandle<()>>,
}

impl ScreenshotScheduler {
    /// Spawn the scheduler thread.
    ///
    /// `region` is the shared capture target, updated externally on
    /// geometry changes; captures are skipped while it is unset.
    pub fn new(screen: Arc<dyn ScreenSource>, region: Arc<Mutex<Option<Region>>>) -> Self {
        let (tx, rx) = unbounded();

        let worker = std::thread::spawn(move || {
            let mut attached: Option<(Arc<SessionTimeline>, PathBuf)> = None;
            let mut deadline: Option<Instant> = None;

            loop {
                let command = match deadline {
                    Some(due) => {
                        let timeout = due.saturating_duration_since(Instant::now());
                        match rx.recv_timeout(timeout) {
                            Ok(command) => command,
                            Err(RecvTimeoutError::Timeout) => {
                                deadline = None;
                                if let Some((timeline, dir)) = attached.as_ref() {
                                    capture(screen.as_ref(), &region, timeline, dir);
                                }
                                continue;
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    None => match rx.recv() {
                        Ok(command) => command,
                        Err(_) => break,
                    },
                };

                match command {
                    SchedulerCommand::Signal { delay } => {
                        if attached.is_some() {
                            // Replaces any pending capture; only the most
                            // recent signal in a burst fires.
                            deadline = Some(Instant::now() + delay);
                        }
                    }
                    SchedulerCommand::Attach { timeline, dir } => {
                        attached = Some((timeline, dir));
                        deadline = None;
                    }
                    SchedulerCommand::Detach => {
                        attached = None;
                        deadline = None;
                    }
                    SchedulerCommand::Cancel => {
                        deadline = None;
                    }
                }
            }
        });

        Self {
            commands: tx,
            worker: Some(worker),
        }
    }

    /// Schedule a capture after `delay`, replacing any pending one.
    pub fn signal(&self, delay: Duration) {
        let _ = self.commands.send(SchedulerCommand::Signal { delay });
    }

    /// Schedule a capture after the short fixed delay.
    pub fn capture_now(&self) {
        self.signal(QUICK_DELAY);
    }

    /// Drop any pending capture. A no-op when nothing is pending.
    pub fn cancel_pending(&self) {
        let _ = self.commands.send(SchedulerCommand::Cancel);
    }

    /// Enable capturing into the given session.
    pub(crate) fn attach(&self, timeline: Arc<SessionTimeline>, dir: PathBuf) {
        let _ = self.commands.send(SchedulerCommand::Attach { timeline, dir });
    }

    /// Disable capturing and drop any pending capture.
    pub(crate) fn detach(&self) {
        let _ = self.commands.send(SchedulerCommand::Detach);
    }
}

impl Drop for ScreenshotScheduler {
    fn drop(&mut self) {
        // Disconnect the channel so the worker exits.
        let (empty_tx, _) = unbounded();
        self.commands = empty_tx;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn capture(
    screen: &dyn ScreenSource,
    region: &Mutex<Option<Region>>,
    timeline: &SessionTimeline,
    dir: &PathBuf,
) {
    let target = match *region.lock().expect("capture region lock poisoned") {
        Some(target) => target,
        None => {
            // Normal during startup: no geometry update has arrived yet.
            debug!("no capture region configured yet, skipping screenshot");
            return;
        }
    };

    let image = match screen.grab(target) {
        Ok(image) => image,
        Err(e) => {
            warn!("screenshot capture failed: {}", e);
            return;
        }
    };

    let now = Utc::now().timestamp_millis();
    let file = format!("screenshot.{}.png", now);
    let path = dir.join(&file);

    if let Err(e) = std::fs::write(&path, image) {
        warn!("failed to write screenshot {:?}: {}", path, e);
        return;
    }

    timeline.append(now, SessionEvent::ImageCapture(ImageCapture { file }));
}
