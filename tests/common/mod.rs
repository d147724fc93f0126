//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use dynamic_upstream::resolver::StaticResolver;
use dynamic_upstream::upstream::{Engine, GroupKind, PeerPool, Protocol, Reclaimer, Zone};

pub const ZONE_SIZE: usize = 64 * 1024;

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// A fresh pool named `web` plus an engine backed by a table resolver.
pub fn setup() -> (Arc<StaticResolver>, Engine, PeerPool) {
    setup_with_zone(ZONE_SIZE)
}

pub fn setup_with_zone(capacity: usize) -> (Arc<StaticResolver>, Engine, PeerPool) {
    let resolver = Arc::new(StaticResolver::new());
    let engine = Engine::new(resolver.clone());
    let zone = Arc::new(Zone::new("web", capacity));
    let pool = PeerPool::new("web", Protocol::Http, zone, Arc::new(Reclaimer::new())).unwrap();
    (resolver, engine, pool)
}

/// (group, label, endpoint) for every member, primary first.
pub fn members(pool: &PeerPool) -> Vec<(GroupKind, String, String)> {
    pool.read()
        .peers()
        .map(|(kind, p)| (kind, p.label().to_string(), p.endpoint().to_string()))
        .collect()
}

pub fn endpoints(pool: &PeerPool) -> Vec<String> {
    members(pool).into_iter().map(|(_, _, e)| e).collect()
}

/// Structural checks that must hold after every operation.
pub fn assert_invariants(pool: &PeerPool) {
    let groups = pool.read();
    assert!(groups.is_consistent(), "group totals out of sync");
    assert!(!groups.primary().is_empty(), "primary group is empty");
    if let Some(backup) = groups.backup() {
        assert!(!backup.is_empty(), "empty backup group kept alive");
    }
    for (kind, peer) in groups.peers() {
        let other = match kind {
            GroupKind::Primary => GroupKind::Backup,
            GroupKind::Backup => GroupKind::Primary,
        };
        if let Some(group) = groups.group(other) {
            assert!(
                !group.peers().iter().any(|p| p.label() == peer.label() && !p.is_sentinel()),
                "{} present in both groups",
                peer.label()
            );
        }
    }
}
