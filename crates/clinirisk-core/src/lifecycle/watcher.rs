//! Background reload task: polls the source stamp and accepts explicit
//! notifications, collapsing bursts inside the debounce window into one
//! reload.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::manager::ModelLifecycleManager;
use crate::config::{DEFAULT_DEBOUNCE_MS, DEFAULT_POLL_INTERVAL_MS};

/// Upper bound on stamp re-checks while waiting for a writer to finish.
const MAX_SETTLE_ROUNDS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

/// Handle for requesting a reload from outside the watcher task.
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    tx: mpsc::Sender<()>,
}

impl ReloadTrigger {
    /// Request a reload. Returns `false` once the watcher has stopped.
    /// A full queue already guarantees a pending reload, so it counts as
    /// delivered.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Swallow notifications until `window` passes without a new one.
async fn drain_burst(rx: &mut mpsc::Receiver<()>, window: Duration) {
    while let Ok(Some(())) = time::timeout(window, rx.recv()).await {}
}

/// Wait until two stamp reads `window` apart agree.
async fn wait_until_stable(manager: &ModelLifecycleManager, window: Duration) {
    if window.is_zero() {
        return;
    }
    let mut previous = manager.source().stamp().await;
    for _ in 0..MAX_SETTLE_ROUNDS {
        time::sleep(window).await;
        let current = manager.source().stamp().await;
        if current == previous {
            return;
        }
        debug!("model source still changing, waiting");
        previous = current;
    }
}

async fn debounced_reload(
    manager: &ModelLifecycleManager,
    rx: &mut mpsc::Receiver<()>,
    opts: WatchOptions,
) {
    drain_burst(rx, opts.debounce).await;
    wait_until_stable(manager, opts.debounce).await;
    manager.reload().await;
}

/// Spawn the watcher task. It stops when `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn_watcher(
    manager: Arc<ModelLifecycleManager>,
    opts: WatchOptions,
    mut shutdown: watch::Receiver<bool>,
) -> (ReloadTrigger, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(16);
    let trigger = ReloadTrigger { tx };
    // the task holds a sender so `recv` only ends with the task itself
    let keepalive = trigger.tx.clone();

    let handle = tokio::spawn(async move {
        let _keepalive = keepalive;
        let mut ticker = time::interval(opts.poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            source = %manager.source().describe(),
            poll_ms = opts.poll_interval.as_millis() as u64,
            debounce_ms = opts.debounce.as_millis() as u64,
            "model watcher started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(()) = rx.recv() => {
                    debounced_reload(&manager, &mut rx, opts).await;
                }
                _ = ticker.tick() => {
                    if manager.source_changed().await {
                        debug!("model source stamp changed");
                        debounced_reload(&manager, &mut rx, opts).await;
                    }
                }
            }
        }

        info!("model watcher stopped");
    });

    (trigger, handle)
}
