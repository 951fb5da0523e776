//! Periodic background liveness check.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::db::{ConnectionSlot, ProbeOutcome};

/// Default interval between probe ticks.
pub const HEALTH_PROBE_PERIOD: Duration = Duration::from_secs(60);

/// Handle to a running probe task. The task stops when this is dropped.
#[derive(Debug)]
pub struct HealthProbe {
    task: JoinHandle<()>,
    period: Duration,
}

impl HealthProbe {
    /// Spawns a task that pings the slot's connection every `period`.
    ///
    /// The task only holds a weak reference, so it ends on its own once the
    /// owning repository is gone.
    #[instrument(skip(runtime, slot))]
    pub(crate) fn spawn(runtime: &Handle, slot: Weak<ConnectionSlot>, period: Duration) -> Self {
        // interval_at panics on a zero period.
        let period = period.max(Duration::from_millis(1));
        info!(?period, "Starting health probe");
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(slot) = slot.upgrade() else {
                    debug!("Repository dropped, stopping health probe");
                    break;
                };
                let outcome = tokio::task::spawn_blocking(move || slot.probe()).await;
                match outcome {
                    Ok(ProbeOutcome::Dropped) => info!("Dead connection released by probe"),
                    Ok(outcome) => debug!(?outcome, "Probe tick"),
                    Err(e) => warn!(error = %e, "Probe tick did not complete"),
                }
            }
        });
        Self { task, period }
    }

    /// Interval between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// True until the task ends or is stopped.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the probe task.
    #[instrument(skip(self))]
    pub fn stop(self) {
        debug!("Stopping health probe");
        // Drop aborts the task.
    }
}

impl Drop for HealthProbe {
    fn drop(&mut self) {
        self.task.abort();
    }
}
