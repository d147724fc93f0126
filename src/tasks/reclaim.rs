//! Periodic reclaimer sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::upstream::reclaim::Reclaimer;

pub struct ReclaimSweeper {
    reclaimer: Arc<Reclaimer>,
    interval: Duration,
}

impl ReclaimSweeper {
    pub fn new(reclaimer: Arc<Reclaimer>, interval: Duration) -> Self {
        Self {
            reclaimer,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Reclaimer starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reclaimer.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Reclaimer received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
