// Timer-driven snapshot capture.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::project::ProjectInner;
use crate::snapshot;
use crate::store::medium::DurableMedium;

pub const DEFAULT_AUTO_SAVE_INTERVAL_SECS: u64 = 30;
pub const MIN_AUTO_SAVE_INTERVAL_SECS: u64 = 5;
pub const MAX_AUTO_SAVE_INTERVAL_SECS: u64 = 3600;

const AUTO_SAVE_DESCRIPTION: &str = "auto-save";

/// Periodic caller of snapshot creation for one project.
///
/// Two states: stopped (initial) and running. `start` while running is a
/// no-op (never a duplicate timer); `stop` prevents future ticks only, it
/// does not abort a tick already executing.
pub struct AutoSaveScheduler<M: DurableMedium + 'static> {
    inner: Arc<Mutex<ProjectInner<M>>>,
    project_path: String,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl<M: DurableMedium + 'static> AutoSaveScheduler<M> {
    pub(crate) fn new(
        inner: Arc<Mutex<ProjectInner<M>>>,
        project_path: String,
        interval_secs: u64,
    ) -> Self {
        Self { inner, project_path, interval: clamp_interval(interval_secs), task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval.as_secs()
    }

    /// Begin ticking. Must be called within a Tokio runtime.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let project_path = self.project_path.clone();
        let period = self.interval;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of `interval` resolves immediately; the
            // schedule starts one full period after `start`.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
                let state = &mut *guard;
                match snapshot::create_snapshot(
                    &state.documents,
                    &mut state.snapshots,
                    &project_path,
                    AUTO_SAVE_DESCRIPTION,
                ) {
                    Ok(Some(snapshot)) => {
                        debug!(project = %project_path, id = %snapshot.id, "auto-save captured");
                    }
                    Ok(None) => {
                        debug!(project = %project_path, "auto-save tick skipped, no changes");
                    }
                    Err(error) => {
                        warn!(project = %project_path, error = %error, "auto-save failed");
                    }
                }
            }
        }));
    }

    /// Stop ticking. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Change the interval (clamped); restarts the timer if running.
    pub fn set_interval(&mut self, interval_secs: u64) {
        self.interval = clamp_interval(interval_secs);
        if self.task.is_some() {
            self.stop();
            self.start();
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.start();
        } else {
            self.stop();
        }
    }
}

impl<M: DurableMedium + 'static> Drop for AutoSaveScheduler<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn clamp_interval(interval_secs: u64) -> Duration {
    Duration::from_secs(interval_secs.clamp(MIN_AUTO_SAVE_INTERVAL_SECS, MAX_AUTO_SAVE_INTERVAL_SECS))
}
