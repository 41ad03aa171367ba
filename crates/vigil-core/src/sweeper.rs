//! Auto-resolution sweeper.
//!
//! Background loop that bulk-resolves incidents nobody has seen recur
//! within the staleness window. Purely time-based: it exists so stale
//! incidents stop being surfaced without user action, independent of
//! whether any fix was verified.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use vigil_state::{IncidentStore, StorageResult};

use crate::config::SweeperConfig;
use crate::metrics::METRICS;
use crate::obs;

/// Periodic bulk-resolver for stale incidents.
pub struct Sweeper {
    incidents: Arc<dyn IncidentStore>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(incidents: Arc<dyn IncidentStore>, config: SweeperConfig) -> Self {
        Self { incidents, config }
    }

    /// Run one sweep at the given instant, returning how many incidents
    /// were resolved. Exposed so tests can single-step without waiting
    /// on wall-clock time.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let cutoff = now - self.config.stale_after;
        let resolved = self.incidents.resolve_stale(cutoff, now).await?;
        METRICS.inc_sweeps_completed();
        obs::emit_sweep_completed(resolved);
        Ok(resolved)
    }

    /// Sweep on the configured interval until shutdown.
    ///
    /// A failed sweep (store unavailable) is logged and the loop keeps
    /// ticking; it never terminates on its own.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            event = "sweeper.started",
            interval_secs = self.config.interval.as_secs(),
            stale_after_minutes = self.config.stale_after.num_minutes(),
        );
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    if let Err(err) = self.sweep_once(Utc::now()).await {
                        obs::emit_sweep_failed(&err);
                    }
                }
            }
        }

        info!(event = "sweeper.stopped");
    }
}

/// Spawn the sweeper loop as a background task.
pub fn spawn_sweeper(
    sweeper: Sweeper,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        sweeper.run(shutdown).await;
    })
}
