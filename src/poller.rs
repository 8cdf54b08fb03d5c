// Poller
// Drives periodic refreshes of the inbox, plus a one-shot retry after a failed cycle

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::inbox::Inbox;

/// Delay before retrying a failed cycle
pub const RETRY_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
}

#[derive(Default)]
struct Timers {
    interval: Option<JoinHandle<()>>,
    backoff: Option<JoinHandle<()>>,
}

struct Shared {
    inbox: Arc<Inbox>,
    timers: Mutex<Timers>,
    backoff: Duration,
}

impl Shared {
    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Periodic fetch driver.
///
/// The regular interval task and the backoff task are independent and may
/// both run a cycle close together. That is tolerated: a refresh is idempotent.
/// Stopping cancels both timers but not cycles already in flight.
pub struct Poller {
    shared: Arc<Shared>,
    interval: Duration,
}

impl Poller {
    /// `interval` is used as given; bounds are the settings layer's job
    pub fn new(inbox: Arc<Inbox>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                inbox,
                timers: Mutex::new(Timers::default()),
                backoff: RETRY_BACKOFF,
            }),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PollerState {
        if self.shared.timers().interval.is_some() {
            PollerState::Running
        } else {
            PollerState::Idle
        }
    }

    /// Start polling: one cycle immediately, then one per interval.
    ///
    /// Must be called from within a tokio runtime. Starting a running poller
    /// does nothing.
    pub fn start(&self) {
        let mut timers = self.shared.timers();
        if timers.interval.is_some() {
            debug!("Poller already running");
            return;
        }

        info!("Starting poller with {}s interval", self.interval.as_secs());
        let shared = self.shared.clone();
        let period = self.interval;
        timers.interval = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // First tick completes immediately
                ticker.tick().await;
                tokio::spawn(run_cycle(shared.clone()));
            }
        }));
    }

    /// Stop both timers. Safe to call when never started.
    pub fn stop(&self) {
        let mut timers = self.shared.timers();
        let was_running = timers.interval.is_some();
        if let Some(handle) = timers.interval.take() {
            handle.abort();
        }
        if let Some(handle) = timers.backoff.take() {
            handle.abort();
        }
        if was_running {
            info!("Poller stopped");
        }
    }

    /// Run one cycle now, outside the timers, with the same retry handling
    pub async fn poll_now(&self) {
        run_cycle(self.shared.clone()).await;
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_cycle(shared: Arc<Shared>) {
    match shared.inbox.refresh().await {
        Ok(fresh) => debug!("Poll cycle complete, {} new", fresh.len()),
        Err(e) if e.is_retryable() => schedule_retry(&shared),
        Err(e) => warn!("Not retrying: {}", e),
    }
}

fn schedule_retry(shared: &Arc<Shared>) {
    let mut timers = shared.timers();
    // A stopped poller schedules nothing, even for cycles that were in flight
    if timers.interval.is_none() {
        return;
    }
    // One pending retry at a time; later failures ride on it
    if let Some(pending) = &timers.backoff {
        if !pending.is_finished() {
            debug!("Retry already scheduled");
            return;
        }
    }

    info!("Retrying in {}s", shared.backoff.as_secs());
    let retry_shared = shared.clone();
    let delay = shared.backoff;
    timers.backoff = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        retry_shared.timers().backoff = None;
        run_cycle(retry_shared).await;
    }));
}
