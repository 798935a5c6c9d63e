//! Periodic scheduling with a single-cycle gate.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info};

use crate::dispatcher::{CycleReport, Dispatcher};

/// Result of asking for a check.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Completed(CycleReport),
    /// A cycle is already in flight; the request coalesces into it.
    AlreadyRunning,
}

/// Drives the dispatcher on a fixed interval. At most one cycle runs at a
/// time; ticks and manual requests arriving mid-cycle are dropped, never
/// queued.
pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    gate: Mutex<()>,
    last_report: RwLock<Option<CycleReport>>,
    shutdown: Notify,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<Dispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval,
            gate: Mutex::new(()),
            last_report: RwLock::new(None),
            shutdown: Notify::new(),
        }
    }

    /// Run one cycle now, unless one is already in flight.
    pub async fn check_now(&self) -> CheckOutcome {
        let Ok(_guard) = self.gate.try_lock() else {
            debug!("check requested while a cycle is running, coalescing");
            return CheckOutcome::AlreadyRunning;
        };
        let report = self.dispatcher.run_cycle().await;
        *self.last_report.write().await = Some(report.clone());
        CheckOutcome::Completed(report)
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// Tick loop. Runs an immediate cycle, then one per interval until
    /// shutdown. An in-flight cycle finishes before the loop exits.
    pub async fn run(self: Arc<Self>) {
        info!("⏰ scheduler started, interval {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let CheckOutcome::AlreadyRunning = self.check_now().await {
                        debug!("tick dropped, cycle still running");
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("🛑 scheduler stopping");
                    break;
                }
            }
        }
    }

    /// Request a graceful stop. The permit is stored, so a notify sent while
    /// a cycle is in flight is not lost.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
