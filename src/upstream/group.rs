//! Peer groups and pools.
//!
//! # Responsibilities
//! - Keep a group's aggregate counters in step with its members
//! - Pair the primary group with a lazily created backup group
//! - Guard both groups with one reader/writer lock per pool
//! - Compute the pool change-hash
//!
//! # Invariants (under the pool lock)
//! - `total_weight == Σ weight`, `single ⇔ len == 1`, `weighted ⇔ total_weight != len`
//! - The primary group is never empty (the sentinel fills it)
//! - The backup group exists iff it has members
//! - (label, endpoint) is unique across both groups

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::upstream::op::{OpError, Protocol};
use crate::upstream::peer::{PeerAttrs, PeerRecord, SENTINEL, SENTINEL_ADDR};
use crate::upstream::reclaim::Reclaimer;
use crate::upstream::zone::{Block, Zone};

/// Bytes charged to the zone for a backup group.
pub(crate) const GROUP_BLOCK_SIZE: usize = std::mem::size_of::<PeerGroup>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Primary,
    Backup,
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKind::Primary => write!(f, "primary"),
            GroupKind::Backup => write!(f, "backup"),
        }
    }
}

/// An ordered set of peers. Order is dispatch priority.
#[derive(Debug, Default)]
pub struct PeerGroup {
    peers: Vec<Arc<PeerRecord>>,
    total_weight: u64,
    single: bool,
    weighted: bool,
}

impl PeerGroup {
    pub fn peers(&self) -> &[Arc<PeerRecord>] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub(crate) fn push(&mut self, peer: Arc<PeerRecord>, weight: u32) {
        self.peers.push(peer);
        self.total_weight += u64::from(weight);
        self.refresh();
    }

    pub(crate) fn remove(&mut self, index: usize) -> Arc<PeerRecord> {
        let peer = self.peers.remove(index);
        let weight = peer.attrs().weight;
        self.total_weight = self.total_weight.saturating_sub(u64::from(weight));
        self.refresh();
        peer
    }

    pub(crate) fn adjust_weight(&mut self, old: u32, new: u32) {
        self.total_weight = self.total_weight.saturating_sub(u64::from(old)) + u64::from(new);
        self.refresh();
    }

    fn refresh(&mut self) {
        let count = self.peers.len() as u64;
        self.single = count == 1;
        self.weighted = self.total_weight != count;
    }

    /// Recompute the aggregates from the members and compare.
    pub fn is_consistent(&self) -> bool {
        let sum: u64 = self.peers.iter().map(|p| u64::from(p.attrs().weight)).sum();
        let count = self.peers.len() as u64;
        sum == self.total_weight
            && self.single == (count == 1)
            && self.weighted == (sum != count)
    }
}

/// Backup group plus the zone block it was allocated from.
#[derive(Debug)]
pub(crate) struct BackupGroup {
    pub(crate) group: PeerGroup,
    block: Block,
}

impl BackupGroup {
    pub(crate) fn allocate(zone: &Zone) -> Option<Self> {
        Some(Self {
            group: PeerGroup::default(),
            block: zone.alloc(GROUP_BLOCK_SIZE)?,
        })
    }

    pub(crate) fn release(self, zone: &Zone) {
        zone.free(self.block);
    }
}

/// Primary and backup groups of one pool.
#[derive(Debug)]
pub struct PoolGroups {
    pub(crate) primary: PeerGroup,
    pub(crate) backup: Option<BackupGroup>,
}

impl PoolGroups {
    pub fn primary(&self) -> &PeerGroup {
        &self.primary
    }

    pub fn backup(&self) -> Option<&PeerGroup> {
        self.backup.as_ref().map(|b| &b.group)
    }

    pub fn group(&self, kind: GroupKind) -> Option<&PeerGroup> {
        match kind {
            GroupKind::Primary => Some(&self.primary),
            GroupKind::Backup => self.backup(),
        }
    }

    pub(crate) fn group_mut(&mut self, kind: GroupKind) -> Option<&mut PeerGroup> {
        match kind {
            GroupKind::Primary => Some(&mut self.primary),
            GroupKind::Backup => self.backup.as_mut().map(|b| &mut b.group),
        }
    }

    /// All members, primary first, each in dispatch order.
    pub fn peers(&self) -> impl Iterator<Item = (GroupKind, &Arc<PeerRecord>)> {
        self.primary
            .peers
            .iter()
            .map(|p| (GroupKind::Primary, p))
            .chain(
                self.backup
                    .iter()
                    .flat_map(|b| b.group.peers.iter().map(|p| (GroupKind::Backup, p))),
            )
    }

    /// Total members across both groups.
    pub fn len(&self) -> usize {
        self.primary.len() + self.backup().map_or(0, PeerGroup::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the primary group holds only the sentinel.
    pub fn is_placeholder_only(&self) -> bool {
        self.primary.single
            && self.primary.peers.first().is_some_and(|p| p.is_sentinel())
    }

    /// Change-hash over every member's label.
    pub fn hash(&self) -> u64 {
        change_hash(self.peers().map(|(_, p)| p.label()))
    }

    /// Check every pool invariant.
    pub fn is_consistent(&self) -> bool {
        if self.primary.is_empty() || !self.primary.is_consistent() {
            return false;
        }
        if let Some(backup) = &self.backup {
            if backup.group.is_empty() || !backup.group.is_consistent() {
                return false;
            }
        }
        let mut seen = HashSet::new();
        self.peers()
            .all(|(_, p)| seen.insert((p.label().to_string(), p.endpoint().to_string())))
    }
}

/// Sum of CRC32 checksums of each label.
///
/// Order-independent, so the hash only moves when the multiset of labels does.
pub fn change_hash<'a>(labels: impl IntoIterator<Item = &'a str>) -> u64 {
    labels
        .into_iter()
        .fold(0u64, |acc, label| acc.wrapping_add(u64::from(crc32fast::hash(label.as_bytes()))))
}

/// The peer pool of one named upstream.
#[derive(Debug)]
pub struct PeerPool {
    upstream: String,
    protocol: Protocol,
    zone: Arc<Zone>,
    reclaimer: Arc<Reclaimer>,
    groups: RwLock<PoolGroups>,
}

impl PeerPool {
    /// Create a pool holding only the sentinel.
    pub fn new(
        upstream: impl Into<String>,
        protocol: Protocol,
        zone: Arc<Zone>,
        reclaimer: Arc<Reclaimer>,
    ) -> Result<Self, OpError> {
        let attrs = PeerAttrs {
            down: true,
            ..PeerAttrs::default()
        };
        let sentinel = PeerRecord::allocate(&zone, SENTINEL, SENTINEL_ADDR, attrs)
            .ok_or(OpError::NoMemory)?;

        let mut primary = PeerGroup::default();
        primary.push(sentinel, 1);

        Ok(Self {
            upstream: upstream.into(),
            protocol,
            zone,
            reclaimer,
            groups: RwLock::new(PoolGroups { primary, backup: None }),
        })
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn zone(&self) -> &Arc<Zone> {
        &self.zone
    }

    pub fn reclaimer(&self) -> &Arc<Reclaimer> {
        &self.reclaimer
    }

    /// Take the pool reader lock.
    pub fn read(&self) -> RwLockReadGuard<'_, PoolGroups> {
        self.groups.read()
    }

    /// Take the pool writer lock.
    ///
    /// The guard can be passed to `Engine::execute_locked` to compose several
    /// operations under one critical section.
    pub fn write(&self) -> PoolWriteGuard<'_> {
        PoolWriteGuard {
            pool: self,
            groups: self.groups.write(),
        }
    }

    /// Current change-hash, under the reader lock.
    pub fn hash(&self) -> u64 {
        self.read().hash()
    }
}

/// Exclusive access to a pool's groups.
pub struct PoolWriteGuard<'a> {
    pool: &'a PeerPool,
    groups: RwLockWriteGuard<'a, PoolGroups>,
}

impl<'a> PoolWriteGuard<'a> {
    pub fn pool(&self) -> &'a PeerPool {
        self.pool
    }

    pub(crate) fn groups_mut(&mut self) -> &mut PoolGroups {
        &mut self.groups
    }
}

impl Deref for PoolWriteGuard<'_> {
    type Target = PoolGroups;
    fn deref(&self) -> &Self::Target {
        &self.groups
    }
}
