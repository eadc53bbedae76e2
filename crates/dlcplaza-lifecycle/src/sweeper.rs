//! Background sweep task.
//!
//! Runs [`SettlementEngine::sweep`] on a fixed interval, followed by a
//! collaborator poll when a chain observer or oracle is attached. Missed
//! ticks are skipped, not bunched. The task stops when its handle is shut
//! down or dropped.

use std::{sync::Arc, time::Duration};

use dlcplaza_types::{DlcError, Result};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::engine::SettlementEngine;

/// Periodic sweeper for one engine.
#[derive(Debug)]
pub struct Sweeper;

impl Sweeper {
    /// Start sweeping per the engine's `sweep` config. Returns `None` when
    /// sweeping is disabled.
    #[must_use]
    pub fn from_config(engine: Arc<SettlementEngine>) -> Option<SweeperHandle> {
        let sweep = &engine.config().sweep;
        if !sweep.enabled {
            info!("sweeper disabled by config");
            return None;
        }
        let interval = sweep.interval();
        Some(Self::spawn(engine, interval))
    }

    /// Start sweeping `engine` every `interval` on the current runtime.
    #[must_use]
    pub fn spawn(engine: Arc<SettlementEngine>, interval: Duration) -> SweeperHandle {
        let (shutdown, mut stop) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_ms = interval.as_millis(), "sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => run_once(&engine),
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("sweeper stopped");
        });

        SweeperHandle { shutdown, task }
    }
}

fn run_once(engine: &SettlementEngine) {
    match engine.sweep() {
        Ok(summary) if summary.is_empty() => debug!("sweep found nothing due"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "sweep failed"),
    }
    if engine.chain.is_some() || engine.oracle.is_some() {
        if let Err(e) = engine.poll_collaborators() {
            warn!(error = %e, "collaborator poll failed");
        }
    }
}

/// Stops a running [`Sweeper`].
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task to stop and wait for it to finish.
    ///
    /// # Errors
    /// `Internal` if the task panicked.
    pub async fn shutdown(self) -> Result<()> {
        // A send error means the task is already gone.
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| DlcError::Internal(format!("sweeper task failed: {e}")))
    }
}
