//! Sync driver.
//!
//! # Responsibilities
//! - Run the reconciler for every upstream with a DNS update interval
//! - Detect drift with ComputeHash for upstreams that only persist state
//! - Rewrite the state file whenever the published hash changes

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinError;
use tokio::time::{self, Instant};

use crate::registry::{Upstream, UpstreamRegistry};
use crate::state;
use crate::upstream::engine::Engine;
use crate::upstream::op::{OpError, OpReply, Operation, Protocol};

#[derive(Debug, Default)]
struct DriverState {
    /// Hash last written to the state file.
    published: Option<u64>,
    last_resolve: Option<Instant>,
}

pub struct SyncDriver {
    registry: Arc<UpstreamRegistry>,
    engine: Arc<Engine>,
    tick: Duration,
    states: HashMap<(Protocol, String), DriverState>,
}

impl SyncDriver {
    pub fn new(registry: Arc<UpstreamRegistry>, engine: Arc<Engine>, tick: Duration) -> Self {
        Self {
            registry,
            engine,
            tick,
            states: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            tick_ms = self.tick.as_millis() as u64,
            upstreams = self.registry.len(),
            "Sync driver starting"
        );

        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Sync driver received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One pass over every upstream.
    pub async fn tick(&mut self) {
        for upstream in self.registry.all() {
            let settings = upstream.settings();
            if settings.dns_update.is_none() && settings.state_file.is_none() {
                continue;
            }

            let key = (upstream.protocol(), upstream.name().to_string());
            let state = self.states.entry(key).or_default();

            let op = match settings.dns_update {
                Some(interval) => {
                    let now = Instant::now();
                    let due = state
                        .last_resolve
                        .map_or(true, |last| now.duration_since(last) >= interval);
                    if due {
                        state.last_resolve = Some(now);
                    }
                    let known = if due { None } else { state.published };
                    Operation::sync(upstream.name(), known)
                }
                None => Operation::hash(upstream.name(), state.published),
            };
            let op = upstream.prepare(op.with_protocol(upstream.protocol()));

            let reply = match run_blocking(&self.engine, &upstream, op).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    tracing::error!(upstream = %upstream.name(), error = %e, "Sync failed");
                    continue;
                }
                Err(e) => {
                    tracing::error!(upstream = %upstream.name(), error = %e, "Sync task failed");
                    continue;
                }
            };

            if reply.hash.is_none() || reply.hash == state.published {
                continue;
            }

            if let Some(path) = settings.state_file.clone() {
                let pool = upstream.pool().clone();
                let saved = tokio::task::spawn_blocking(move || state::save(&pool, &path)).await;
                match saved {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(upstream = %upstream.name(), error = %e, "Failed to save state file");
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(upstream = %upstream.name(), error = %e, "State save task failed");
                        continue;
                    }
                }
            }
            state.published = reply.hash;
        }
    }
}

/// Sync resolves names synchronously, so it runs off the async workers.
async fn run_blocking(
    engine: &Arc<Engine>,
    upstream: &Arc<Upstream>,
    op: Operation,
) -> Result<Result<OpReply, OpError>, JoinError> {
    let engine = engine.clone();
    let upstream = upstream.clone();
    tokio::task::spawn_blocking(move || engine.execute(upstream.pool(), &op)).await
}
