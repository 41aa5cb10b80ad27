//! Debounced refresh scheduler
//!
//! Consumes change-bus signals and turns each burst of them into a single
//! refresh job: flush the whole cache, then rebuild the derived view.
//!
//! State machine over `(armed, running)`:
//! - idle + signal: arm a one-shot timer for `delay`.
//! - armed + signal: nothing, the pending timer covers it.
//! - timer fires, no job running: disarm, run the job.
//! - timer fires while a job is running: see [`OverlapPolicy`].
//! - job ends, successfully or not: back to idle.
//!
//! At most one job runs at any instant. Job failures are logged and
//! swallowed; the next signal starts a fresh attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::TtlCache;
use crate::persistence::SnapshotStore;
use crate::utils::error::RefreshError;

/// What to do when the debounce timer fires while the previous job is still
/// running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Keep the armed flag and start a fresh timer for the full delay, so the
    /// signal that armed it is served after the running job.
    #[default]
    Rearm,
    /// Legacy behavior: the fire is a no-op and the armed flag stays set.
    /// Every later signal then sees "already armed" and no job ever runs
    /// again. Only useful to reproduce that behavior.
    KeepArmed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub armed: bool,
    pub running: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs started.
    pub runs: u64,
    /// Jobs that ended in an error.
    pub failures: u64,
    /// Timer fires that found a job already running.
    pub overlapping_fires: u64,
}

#[derive(Debug, Default)]
struct Counters {
    runs: AtomicU64,
    failures: AtomicU64,
    overlapping_fires: AtomicU64,
}

pub struct RefreshScheduler {
    state: Mutex<SchedulerState>,
    delay: Duration,
    policy: OverlapPolicy,
    cache: Arc<TtlCache>,
    store: Arc<dyn SnapshotStore>,
    counters: Counters,
    cancel: CancellationToken,
}

// Clears `running` even if the job panics, so the scheduler cannot wedge.
struct RunningGuard<'a>(&'a RefreshScheduler);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().running = false;
    }
}

impl RefreshScheduler {
    pub fn new(
        delay: Duration,
        policy: OverlapPolicy,
        cache: Arc<TtlCache>,
        store: Arc<dyn SnapshotStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            delay,
            policy,
            cache,
            store,
            counters: Counters::default(),
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SchedulerState {
        *self.lock()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            runs: self.counters.runs.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            overlapping_fires: self.counters.overlapping_fires.load(Ordering::Relaxed),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// Observe one change signal. Arms the timer unless it already is.
    pub fn signal(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.armed {
                return;
            }
            state.armed = true;
        }
        debug!(delay_ms = self.delay.as_millis() as u64, "refresh armed");
        self.arm_timer();
    }

    fn arm_timer(self: &Arc<Self>) {
        // `sleep` saturates a deadline past the clock's range instead of
        // overflowing.
        let timer = tokio::time::sleep(self.delay);
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = scheduler.cancel.cancelled() => {}
                _ = timer => scheduler.on_timer_fired().await,
            }
        });
    }

    async fn on_timer_fired(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.running {
                self.counters
                    .overlapping_fires
                    .fetch_add(1, Ordering::Relaxed);
                match self.policy {
                    OverlapPolicy::KeepArmed => {
                        warn!("refresh timer fired during a running job; signal dropped");
                        return;
                    }
                    OverlapPolicy::Rearm => {
                        // Clear-and-rearm collapses to "stay armed, new timer".
                        state.armed = true;
                        drop(state);
                        debug!("refresh still running; timer re-armed");
                        self.arm_timer();
                        return;
                    }
                }
            }
            state.armed = false;
            state.running = true;
        }

        let _guard = RunningGuard(self.as_ref());
        self.counters.runs.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        match self.run_job().await {
            Ok(()) => info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "derived view refreshed"
            ),
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "refresh failed");
            }
        }
    }

    async fn run_job(&self) -> Result<(), RefreshError> {
        self.cache.flush_all();
        debug!("cache cleared");
        self.store.rebuild_derived_view().await?;
        Ok(())
    }

    /// Feed every signal from `signals` into the state machine until the
    /// scheduler is cancelled or the bus goes away.
    pub fn spawn(self: &Arc<Self>, mut signals: Receiver<()>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = scheduler.cancel.cancelled() => break,
                    msg = signals.recv() => match msg {
                        Ok(()) => scheduler.signal(),
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "change signals coalesced");
                            scheduler.signal();
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("refresh scheduler stopped");
        })
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("state", &self.state())
            .field("delay", &self.delay)
            .field("policy", &self.policy)
            .finish()
    }
}
