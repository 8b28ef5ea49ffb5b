use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::info;

use crate::{storage::Trigger, sync::engine::SyncEngine};

/// Periodic driver for [`SyncEngine`]. Stops when the shutdown channel flips
/// to `true` or its sender is dropped.
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    period: Duration,
    run_on_startup: bool,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, period: Duration, run_on_startup: bool) -> Self {
        Self {
            engine,
            period,
            run_on_startup,
        }
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // the first tick completes immediately
            if !self.run_on_startup {
                ticker.tick().await;
            }

            info!("Scheduler started (every {}s)", self.period.as_secs());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.engine.trigger(Trigger::Scheduled).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Scheduler stopped");
        })
    }
}
