//! Peer record abstraction.
//!
//! # Responsibilities
//! - Represent a single backend endpoint behind an upstream
//! - Guard mutable attributes with a per-record lock
//! - Track live connections held by in-flight requests
//! - Carry the explicit lifecycle tag (Linked → Unlinked → Freed)

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::ops::Deref;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, MutexGuard};

use crate::upstream::zone::{Block, Reservation, Zone};

/// Placeholder endpoint meaning "this pool has no real backend".
pub const SENTINEL: &str = "0.0.0.0:1";

/// Socket address of [`SENTINEL`].
pub const SENTINEL_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 1));

/// Return true if `addr` is the reserved placeholder address.
pub fn is_reserved(addr: &str) -> bool {
    addr.len() >= SENTINEL.len() && addr.starts_with("0.0.0.0")
}

/// Lifecycle of a peer record.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Reachable from its group.
    Linked = 0,
    /// Removed from its group, waiting for in-flight requests to finish.
    Unlinked = 1,
    /// Backing memory returned to the zone.
    Freed = 2,
}

impl From<u8> for PeerState {
    fn from(val: u8) -> Self {
        match val {
            1 => PeerState::Unlinked,
            2 => PeerState::Freed,
            _ => PeerState::Linked,
        }
    }
}

/// Mutable attributes of a peer, guarded by the record lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAttrs {
    pub weight: u32,
    pub effective_weight: u32,
    /// Smooth weighted round-robin state.
    pub current_weight: i64,
    pub max_fails: u32,
    pub fail_timeout: Duration,
    /// 0 means unlimited.
    pub max_conns: u32,
    pub down: bool,
    /// Consecutive failures.
    pub fails: u32,
    /// Last state change, seconds since epoch.
    pub checked: u64,
    /// Live connections held by in-flight requests.
    pub conns: u32,
}

impl Default for PeerAttrs {
    fn default() -> Self {
        Self {
            weight: 1,
            effective_weight: 1,
            current_weight: 0,
            max_fails: 1,
            fail_timeout: Duration::from_secs(10),
            max_conns: 0,
            down: false,
            fails: 0,
            checked: 0,
            conns: 0,
        }
    }
}

/// Lock-protected part of a record.
#[derive(Debug)]
pub(crate) struct PeerInner {
    pub(crate) attrs: PeerAttrs,
    blocks: Vec<Block>,
}

/// A single backend endpoint.
#[derive(Debug)]
pub struct PeerRecord {
    /// The server string the operator supplied (hostname or literal).
    label: String,
    /// The resolved endpoint actually dialed, `ip:port` or `[ip]:port`.
    endpoint: String,
    sockaddr: SocketAddr,
    state: AtomicU8,
    inner: Mutex<PeerInner>,
}

impl PeerRecord {
    /// Build a linked record owning `blocks` of zone memory.
    pub(crate) fn new(
        label: impl Into<String>,
        sockaddr: SocketAddr,
        attrs: PeerAttrs,
        blocks: Vec<Block>,
    ) -> Self {
        Self {
            label: label.into(),
            endpoint: sockaddr.to_string(),
            sockaddr,
            state: AtomicU8::new(PeerState::Linked as u8),
            inner: Mutex::new(PeerInner { attrs, blocks }),
        }
    }

    /// Allocate a record and its buffers from `zone`.
    ///
    /// Returns `None` if any block cannot be taken; blocks already taken are
    /// returned to the zone before this function exits.
    pub(crate) fn allocate(
        zone: &Zone,
        label: &str,
        sockaddr: SocketAddr,
        attrs: PeerAttrs,
    ) -> Option<Arc<Self>> {
        let endpoint_len = sockaddr.to_string().len();
        let mut reservation = Reservation::new(zone);
        reservation.take(std::mem::size_of::<PeerRecord>())?;
        reservation.take(label.len() + 1)?;
        reservation.take(endpoint_len + 1)?;
        reservation.take(std::mem::size_of::<SocketAddr>())?;

        Some(Arc::new(Self::new(label, sockaddr, attrs, reservation.commit())))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn sockaddr(&self) -> SocketAddr {
        self.sockaddr
    }

    pub fn state(&self) -> PeerState {
        PeerState::from(self.state.load(Ordering::Acquire))
    }

    /// Snapshot of the attributes taken under the record lock.
    pub fn attrs(&self) -> PeerAttrs {
        self.inner.lock().attrs.clone()
    }

    pub fn conns(&self) -> u32 {
        self.inner.lock().attrs.conns
    }

    /// The pool-wide placeholder record.
    pub fn is_sentinel(&self) -> bool {
        is_reserved(&self.label) && is_reserved(&self.endpoint)
    }

    /// A hostname added ahead of resolution.
    pub fn is_unresolved(&self) -> bool {
        is_reserved(&self.endpoint) && !is_reserved(&self.label)
    }

    pub fn is_ipv6(&self) -> bool {
        self.endpoint.starts_with('[')
    }

    /// Match against a removal/update filter.
    ///
    /// With both sides given the pair must match exactly; with only `server`
    /// it may name either the label or the endpoint.
    pub fn matches(&self, server: &str, peer: Option<&str>) -> bool {
        match peer {
            Some(peer) => self.label == server && self.endpoint == peer,
            None => self.label == server || self.endpoint == server,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PeerInner> {
        self.inner.lock()
    }

    pub(crate) fn mark_unlinked(&self) {
        self.state.store(PeerState::Unlinked as u8, Ordering::Release);
    }

    /// Free the record's zone memory if no request still holds it.
    ///
    /// Returns false while connections are outstanding.
    pub(crate) fn try_release(&self, zone: &Zone) -> bool {
        let mut inner = self.inner.lock();
        if inner.attrs.conns != 0 {
            return false;
        }
        let blocks = std::mem::take(&mut inner.blocks);
        self.state.store(PeerState::Freed as u8, Ordering::Release);
        drop(inner);

        for block in blocks {
            zone.free(block);
        }
        true
    }

    /// Take a connection slot for an in-flight request.
    ///
    /// Fails if the record is no longer linked or `max_conns` is reached.
    pub fn try_acquire(self: &Arc<Self>) -> Option<PeerConnectionGuard> {
        let mut inner = self.inner.lock();
        if self.state() != PeerState::Linked {
            return None;
        }
        let max = inner.attrs.max_conns;
        if max != 0 && inner.attrs.conns >= max {
            return None;
        }
        inner.attrs.conns += 1;
        drop(inner);

        Some(PeerConnectionGuard { peer: self.clone() })
    }

    fn release_connection(&self) {
        let mut inner = self.inner.lock();
        inner.attrs.conns = inner.attrs.conns.saturating_sub(1);
    }
}

/// Current time in seconds since the epoch.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A RAII guard for one connection against a peer.
#[derive(Debug)]
pub struct PeerConnectionGuard {
    peer: Arc<PeerRecord>,
}

impl Deref for PeerConnectionGuard {
    type Target = PeerRecord;
    fn deref(&self) -> &Self::Target {
        &self.peer
    }
}

impl Drop for PeerConnectionGuard {
    fn drop(&mut self) {
        self.peer.release_connection();
    }
}
