//! Deadlock watcher.
//!
//! # Responsibilities
//! - Keep the registry of live listeners behind one coarse lock
//! - Periodically classify listeners as waiting, processing, or over the
//!   running-time threshold
//! - Trigger a full protocol-server restart when the pool looks wedged
//!
//! # Design Decisions
//! - Restart fires only when EVERY processing listener is over threshold
//!   and at least one is processing; a single healthy listener suppresses
//!   it even if all others are over
//! - Restart additionally requires the permission flag
//! - First scan after a short fixed delay, then at the configured period,
//!   scans never overlap

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

use crate::config::AjpConfig;
use crate::net::listener::ListenerActivity;

/// Delay before the watcher's first scan.
const FIRST_SCAN_DELAY: Duration = Duration::from_secs(5);

struct ListenerEntry {
    activity: Arc<ListenerActivity>,
    abort: AbortHandle,
}

/// Registry of live listeners, keyed by listener number.
///
/// One mutex guards add, remove and scan; the registry is only touched on
/// listener lifecycle events and once per watchdog period.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Mutex<HashMap<u32, ListenerEntry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Re-adding a known number is a no-op.
    pub fn add(&self, activity: Arc<ListenerActivity>, abort: AbortHandle) {
        self.lock()
            .entry(activity.number())
            .or_insert(ListenerEntry { activity, abort });
    }

    /// Remove a listener; unknown numbers return nothing.
    pub fn remove(&self, number: u32) -> Option<Arc<ListenerActivity>> {
        self.lock().remove(&number).map(|entry| entry.activity)
    }

    /// Abort every registered listener task and clear the registry.
    pub fn stop_all(&self) {
        let mut inner = self.lock();
        for (number, entry) in inner.drain() {
            tracing::debug!(listener = number, "stopping listener");
            entry.abort.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, ListenerEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle used to ask the server for a full restart.
#[derive(Clone)]
pub struct RestartHandle {
    tx: mpsc::Sender<&'static str>,
}

impl RestartHandle {
    pub fn new() -> (Self, mpsc::Receiver<&'static str>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Request a restart; a restart already pending absorbs the request.
    pub fn request_restart(&self, reason: &'static str) {
        let _ = self.tx.try_send(reason);
    }
}

/// Tally of one watchdog scan.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub waiting: usize,
    pub processing: usize,
    pub exceeded: usize,
    pub restart_requested: bool,
}

/// The periodic deadlock scan over all live listeners.
pub struct Watcher {
    config: Arc<AjpConfig>,
    registry: Arc<ListenerRegistry>,
    restart: RestartHandle,
}

impl Watcher {
    pub fn new(
        config: Arc<AjpConfig>,
        registry: Arc<ListenerRegistry>,
        restart: RestartHandle,
    ) -> Self {
        Self {
            config,
            registry,
            restart,
        }
    }

    /// Run scans until shutdown. Disabled watchers return immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.watcher_enabled {
            tracing::info!("watcher disabled");
            return;
        }
        tracing::info!(
            frequency_ms = self.config.watcher_frequency_ms,
            max_running_time_ms = self.config.watcher_max_running_time_ms,
            permission = self.config.watcher_permission,
            "watcher starting"
        );
        // interval panics on a zero period
        let frequency = self.config.watcher_frequency().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + FIRST_SCAN_DELAY,
            frequency,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan();
                }
                _ = shutdown.recv() => {
                    tracing::info!("watcher stopping");
                    break;
                }
            }
        }
    }

    /// One classification pass over the registry.
    ///
    /// The pool counts as deadlocked when at least one listener is
    /// processing and every processing listener has exceeded the maximum
    /// running time.
    pub fn scan(&self) -> ScanSummary {
        let max = self.config.watcher_max_running_time();
        let mut summary = ScanSummary::default();
        {
            let inner = self.registry.lock();
            for entry in inner.values() {
                match entry.activity.processing_elapsed() {
                    None => summary.waiting += 1,
                    Some(elapsed) => {
                        summary.processing += 1;
                        if elapsed > max {
                            summary.exceeded += 1;
                            tracing::debug!(
                                listener = entry.activity.number(),
                                elapsed_ms = elapsed.as_millis() as u64,
                                description = entry.activity.description().as_deref().unwrap_or("-"),
                                "listener over running-time threshold"
                            );
                        }
                    }
                }
            }
        }

        if summary.processing > 0 && summary.processing == summary.exceeded {
            tracing::warn!(
                processing = summary.processing,
                "every active listener exceeded the running-time limit, pool looks deadlocked"
            );
            if self.config.watcher_permission {
                tracing::error!("requesting full protocol-server restart");
                self.restart.request_restart("listener pool deadlock");
                summary.restart_requested = true;
            } else {
                tracing::warn!("restart permission disabled, leaving pool as is");
            }
        } else {
            tracing::trace!(
                waiting = summary.waiting,
                processing = summary.processing,
                exceeded = summary.exceeded,
                total = summary.waiting + summary.processing,
                "watcher scan"
            );
        }
        summary
    }
}
