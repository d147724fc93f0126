//! Deferred reclamation of removed peers.
//!
//! # Data Flow
//! ```text
//! Remove unlinks a peer
//!     → retire(): free now if no connection holds it
//!     → otherwise queue it
//! Periodic sweep (tasks::reclaim)
//!     → try each queued peer under its record lock
//!     → free when conns == 0, keep queued otherwise
//! ```
//!
//! The queue is created on first use and torn down by [`Reclaimer::shutdown`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::observability::metrics;
use crate::upstream::peer::PeerRecord;
use crate::upstream::zone::Zone;

#[derive(Debug)]
struct Retired {
    zone: Arc<Zone>,
    peer: Arc<PeerRecord>,
}

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub freed: usize,
    pub pending: usize,
}

/// Process-wide deferred free queue.
#[derive(Debug, Default)]
pub struct Reclaimer {
    queue: Mutex<Option<Vec<Retired>>>,
}

impl Reclaimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an unlinked peer.
    pub fn retire(&self, zone: &Arc<Zone>, peer: Arc<PeerRecord>) {
        if peer.try_release(zone) {
            return;
        }

        tracing::debug!(
            server = %peer.label(),
            peer = %peer.endpoint(),
            conns = peer.conns(),
            "Peer still referenced, deferring free"
        );

        let mut queue = self.queue.lock();
        let queue = queue.get_or_insert_with(Vec::new);
        queue.push(Retired {
            zone: zone.clone(),
            peer,
        });
        metrics::record_reclaim_pending(queue.len());
    }

    /// Try to free every queued peer once.
    pub fn sweep(&self) -> SweepStats {
        let mut guard = self.queue.lock();
        let Some(queue) = guard.as_mut() else {
            return SweepStats::default();
        };

        let before = queue.len();
        queue.retain(|r| !r.peer.try_release(&r.zone));
        let stats = SweepStats {
            freed: before - queue.len(),
            pending: queue.len(),
        };

        if stats.freed > 0 {
            tracing::debug!(freed = stats.freed, pending = stats.pending, "Reclaimed peers");
        }
        metrics::record_reclaim_pending(stats.pending);
        stats
    }

    /// Peers still waiting for their connections to drain.
    pub fn pending(&self) -> usize {
        self.queue.lock().as_ref().map_or(0, Vec::len)
    }

    /// Final sweep and queue teardown. Returns how many peers were still
    /// referenced and never freed.
    pub fn shutdown(&self) -> usize {
        let stats = self.sweep();
        let leaked = self.queue.lock().take().map_or(0, |q| q.len());
        if leaked > 0 {
            tracing::warn!(pending = leaked, "Reclaimer stopped with referenced peers");
        }
        debug_assert_eq!(stats.pending, leaked);
        leaked
    }
}
