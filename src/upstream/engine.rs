//! Operation engine.
//!
//! # Data Flow
//! ```text
//! Operation
//!     → Add:    resolve (no lock held) → writer lock → add each endpoint
//!     → Remove: writer lock → unlink matches → reclaimer
//!     → Update: writer lock → per-record lock → mutate attributes
//!     → Hash:   reader lock → compare with the caller's hash
//!     → Sync:   see `upstream::sync`
//!     → List:   nothing to do; the caller renders the pool
//! ```
//!
//! # Design Decisions
//! - Callers that already hold the writer lock pass their [`PoolWriteGuard`]
//!   to [`Engine::execute_locked`] instead of a "no lock" flag
//! - A failed allocation leaves the pool exactly as it was

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::observability::metrics;
use crate::resolver::{Resolution, Resolver};
use crate::upstream::group::{BackupGroup, GroupKind, PeerGroup, PeerPool, PoolGroups, PoolWriteGuard};
use crate::upstream::op::{OpError, OpKind, OpReply, OpStatus, Operation, PeerParams};
use crate::upstream::peer::{is_reserved, now_secs, PeerAttrs, PeerRecord, SENTINEL, SENTINEL_ADDR};
use crate::upstream::sync;

/// How a single endpoint is inserted.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PeerSpec {
    pub backup: bool,
    pub params: PeerParams,
    pub down: bool,
    pub ipv6: bool,
}

/// Endpoints an Add will insert.
struct Resolved {
    addrs: Vec<SocketAddr>,
    /// The label is still waiting for DNS; a placeholder endpoint is used.
    pending: bool,
}

/// Applies operations to peer pools.
pub struct Engine {
    resolver: Arc<dyn Resolver>,
}

impl Engine {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    /// Apply `op` to `pool`, taking whatever locks it needs.
    pub fn execute(&self, pool: &PeerPool, op: &Operation) -> Result<OpReply, OpError> {
        let result = self.dispatch(pool, op);

        let outcome = match &result {
            Ok(reply) => reply.status.as_str(),
            Err(_) => "error",
        };
        metrics::record_operation(pool.upstream(), op.kind.as_str(), outcome);
        if matches!(result, Ok(ref reply) if reply.changed())
            && matches!(op.kind, OpKind::Add | OpKind::Remove | OpKind::Sync)
        {
            metrics::record_pool_size(pool.upstream(), &pool.read());
        }

        result
    }

    /// Apply `op` under a writer lock the caller already holds.
    ///
    /// Sync resolves names and takes the lock itself, so it is rejected here.
    pub fn execute_locked(
        &self,
        guard: &mut PoolWriteGuard<'_>,
        op: &Operation,
    ) -> Result<OpReply, OpError> {
        match op.kind {
            OpKind::List => Ok(OpReply::ok()),
            OpKind::Add => {
                let server = op.require_server()?;
                let resolved = self.resolve_for_add(op, server)?;
                add_resolved(guard, op, server, resolved)
            }
            OpKind::Remove => {
                let server = op.require_server()?;
                remove_peers(guard, server, op.peer.as_deref())
            }
            OpKind::Update => update_peers(guard, op),
            OpKind::Hash => Ok(compare_hash(&**guard, op.hash)),
            OpKind::Sync => Err(OpError::BadRequest(
                "sync cannot run under a held pool lock".into(),
            )),
        }
    }

    fn dispatch(&self, pool: &PeerPool, op: &Operation) -> Result<OpReply, OpError> {
        match op.kind {
            OpKind::List => Ok(OpReply::ok()),
            OpKind::Add => {
                let server = op.require_server()?;
                let resolved = self.resolve_for_add(op, server)?;
                add_resolved(&mut pool.write(), op, server, resolved)
            }
            OpKind::Remove => {
                let server = op.require_server()?;
                remove_peers(&mut pool.write(), server, op.peer.as_deref())
            }
            OpKind::Update => update_peers(&mut pool.write(), op),
            OpKind::Hash => Ok(compare_hash(&pool.read(), op.hash)),
            OpKind::Sync => sync::reconcile(self, pool, op),
        }
    }

    fn resolve_for_add(&self, op: &Operation, server: &str) -> Result<Resolved, OpError> {
        match self.resolver.resolve(server, op.resolve_sync) {
            Resolution::Resolved(addrs) if !addrs.is_empty() => Ok(Resolved {
                addrs,
                pending: false,
            }),
            Resolution::Resolved(_) => Err(OpError::ResolveFailed("failed to resolve".into())),
            Resolution::Pending if op.resolve => Ok(Resolved {
                addrs: vec![SENTINEL_ADDR],
                pending: true,
            }),
            Resolution::Pending => Err(OpError::ResolveUnsupported),
            Resolution::Failed(reason) => Err(OpError::ResolveFailed(reason)),
        }
    }
}

fn add_resolved(
    guard: &mut PoolWriteGuard<'_>,
    op: &Operation,
    server: &str,
    resolved: Resolved,
) -> Result<OpReply, OpError> {
    let placeholder_only = guard.is_placeholder_only();
    let spec = PeerSpec {
        backup: op.backup,
        params: op.params,
        down: op.down || resolved.pending,
        ipv6: op.ipv6,
    };

    let mut linked: Vec<String> = Vec::new();
    for addr in &resolved.addrs {
        match add_peer(guard, server, *addr, &spec) {
            Ok(true) => linked.push(addr.to_string()),
            Ok(false) => {}
            Err(e) => {
                unlink_added(guard, server, &linked);
                return Err(e);
            }
        }
    }
    let created = linked.len();

    if placeholder_only && !guard.primary().is_single() {
        remove_peers(guard, SENTINEL, Some(SENTINEL))?;
    }

    Ok(match (created, resolved.pending) {
        (0, _) => OpReply {
            detail: Some("exists"),
            ..OpReply::not_modified()
        },
        (_, true) => OpReply {
            status: OpStatus::Processing,
            hash: None,
            detail: Some("DNS resolving in progress"),
        },
        _ => OpReply::ok(),
    })
}

/// Insert one (label, endpoint) pair.
///
/// Returns `Ok(false)` when the pair is already present in the target group
/// or the endpoint is IPv6 and IPv6 is disabled.
pub(crate) fn add_peer(
    guard: &mut PoolWriteGuard<'_>,
    label: &str,
    addr: SocketAddr,
    spec: &PeerSpec,
) -> Result<bool, OpError> {
    if addr.is_ipv6() && !spec.ipv6 {
        return Ok(false);
    }

    let target = if spec.backup { GroupKind::Backup } else { GroupKind::Primary };
    let endpoint = addr.to_string();
    let reserved = is_reserved(&endpoint);

    for (kind, peer) in guard.peers() {
        if peer.label() == label && kind != target {
            return Err(OpError::Conflict);
        }
        if kind == target
            && (peer.matches(label, Some(&endpoint)) || (reserved && peer.label() == label))
        {
            return Ok(false);
        }
    }

    let inherited = guard
        .primary()
        .peers()
        .first()
        .map(|p| p.attrs())
        .unwrap_or_default();
    let weight = spec.params.weight.unwrap_or(1);
    let attrs = PeerAttrs {
        weight,
        effective_weight: weight,
        current_weight: 0,
        max_fails: spec.params.max_fails.unwrap_or(inherited.max_fails),
        fail_timeout: spec
            .params
            .fail_timeout
            .map(|secs| Duration::from_secs(secs.into()))
            .unwrap_or(inherited.fail_timeout),
        max_conns: spec.params.max_conns.unwrap_or(inherited.max_conns),
        down: spec.down,
        fails: 0,
        checked: now_secs(),
        conns: 0,
    };

    let pool = guard.pool();
    let zone = pool.zone();

    let fresh_backup = if spec.backup && guard.backup().is_none() {
        Some(BackupGroup::allocate(zone).ok_or(OpError::NoMemory)?)
    } else {
        None
    };

    let Some(peer) = PeerRecord::allocate(zone, label, addr, attrs) else {
        if let Some(group) = fresh_backup {
            group.release(zone);
        }
        return Err(OpError::NoMemory);
    };

    let groups = guard.groups_mut();
    if let Some(group) = fresh_backup {
        groups.backup = Some(group);
    }
    let Some(group) = groups.group_mut(target) else {
        peer.try_release(zone);
        return Err(OpError::NoMemory);
    };
    group.push(peer, weight);

    info!(
        upstream = %pool.upstream(),
        server = %label,
        peer = %display_endpoint(&endpoint),
        backup = spec.backup,
        "Added peer"
    );
    Ok(true)
}

/// Remove every peer matching the filter.
///
/// The primary group is never left empty: removing its last real peer first
/// inserts the sentinel.
pub(crate) fn remove_peers(
    guard: &mut PoolWriteGuard<'_>,
    server: &str,
    peer: Option<&str>,
) -> Result<OpReply, OpError> {
    let pool = guard.pool();
    let mut removed = 0usize;

    while let Some((kind, index)) = find_match(&**guard, server, peer) {
        if kind == GroupKind::Primary && guard.primary().is_single() {
            let is_sentinel = guard
                .primary()
                .peers()
                .get(index)
                .is_some_and(|p| p.is_sentinel());
            if is_sentinel {
                break;
            }
            let placeholder = PeerSpec {
                down: true,
                ..PeerSpec::default()
            };
            if !add_peer(guard, SENTINEL, SENTINEL_ADDR, &placeholder)? {
                break;
            }
            continue;
        }

        let groups = guard.groups_mut();
        let Some(group) = groups.group_mut(kind) else {
            break;
        };
        let victim = group.remove(index);
        let emptied = group.is_empty();

        if kind == GroupKind::Backup && emptied {
            if let Some(backup) = groups.backup.take() {
                backup.release(pool.zone());
            }
        }

        if !is_reserved(victim.endpoint()) {
            info!(
                upstream = %pool.upstream(),
                server = %victim.label(),
                peer = %victim.endpoint(),
                "Removed peer"
            );
        }

        victim.mark_unlinked();
        pool.reclaimer().retire(pool.zone(), victim);
        removed += 1;
    }

    Ok(if removed > 0 {
        OpReply::ok()
    } else {
        OpReply::not_modified()
    })
}

/// Roll back the endpoints a failed Add already linked.
fn unlink_added(guard: &mut PoolWriteGuard<'_>, server: &str, endpoints: &[String]) {
    for endpoint in endpoints {
        if let Err(e) = remove_peers(guard, server, Some(endpoint)) {
            tracing::error!(
                upstream = %guard.pool().upstream(),
                server = %server,
                peer = %endpoint,
                error = %e,
                "Failed to roll back partially added server"
            );
        }
    }
}

fn find_match(groups: &PoolGroups, server: &str, peer: Option<&str>) -> Option<(GroupKind, usize)> {
    [GroupKind::Primary, GroupKind::Backup]
        .into_iter()
        .find_map(|kind| {
            let group = groups.group(kind)?;
            let index = group.peers().iter().position(|p| p.matches(server, peer))?;
            Some((kind, index))
        })
}

fn update_peers(guard: &mut PoolWriteGuard<'_>, op: &Operation) -> Result<OpReply, OpError> {
    let server = op.require_server()?;
    let upstream = guard.pool().upstream();
    let groups = guard.groups_mut();
    let mut updated = 0usize;

    for kind in [GroupKind::Primary, GroupKind::Backup] {
        let Some(group) = groups.group_mut(kind) else {
            continue;
        };
        let matched: Vec<Arc<PeerRecord>> = group
            .peers()
            .iter()
            .filter(|p| p.matches(server, op.peer.as_deref()))
            .cloned()
            .collect();

        for peer in matched {
            update_peer(group, &peer, op, upstream);
            updated += 1;
        }
    }

    if updated == 0 {
        return Err(OpError::NotFound);
    }
    Ok(OpReply::ok())
}

fn update_peer(group: &mut PeerGroup, peer: &PeerRecord, op: &Operation, upstream: &str) {
    let mut inner = peer.lock();
    let attrs = &mut inner.attrs;

    if let Some(weight) = op.params.weight {
        group.adjust_weight(attrs.weight, weight);
        attrs.weight = weight;
        attrs.effective_weight = weight;
        attrs.current_weight = i64::from(weight);
    }
    if let Some(max_fails) = op.params.max_fails {
        attrs.max_fails = max_fails;
    }
    if let Some(secs) = op.params.fail_timeout {
        attrs.fail_timeout = Duration::from_secs(secs.into());
    }
    if let Some(max_conns) = op.params.max_conns {
        attrs.max_conns = max_conns;
    }

    if op.up {
        attrs.down = false;
        attrs.fails = 0;
        attrs.checked = now_secs();
        info!(upstream = %upstream, server = %peer.label(), peer = %peer.endpoint(), "Peer up");
    }
    if op.down {
        attrs.down = true;
        attrs.fails = attrs.max_fails;
        attrs.checked = now_secs();
        info!(upstream = %upstream, server = %peer.label(), peer = %peer.endpoint(), "Peer down");
    }
}

fn compare_hash(groups: &PoolGroups, known: Option<u64>) -> OpReply {
    let hash = groups.hash();
    let reply = if known == Some(hash) {
        OpReply::not_modified()
    } else {
        OpReply::ok()
    };
    reply.with_hash(hash)
}

fn display_endpoint(endpoint: &str) -> &str {
    if is_reserved(endpoint) {
        "-.-.-.-"
    } else {
        endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticResolver;
    use crate::upstream::group::GROUP_BLOCK_SIZE;
    use crate::upstream::op::Protocol;
    use crate::upstream::reclaim::Reclaimer;
    use crate::upstream::zone::Zone;

    fn setup(capacity: usize) -> (Engine, PeerPool) {
        let zone = Arc::new(Zone::new("test", capacity));
        let pool = PeerPool::new("web", Protocol::Http, zone, Arc::new(Reclaimer::new())).unwrap();
        (Engine::new(Arc::new(StaticResolver::new())), pool)
    }

    fn labels(pool: &PeerPool) -> Vec<(GroupKind, String)> {
        pool.read()
            .peers()
            .map(|(kind, p)| (kind, p.label().to_string()))
            .collect()
    }

    #[test]
    fn test_first_add_replaces_sentinel() {
        let (engine, pool) = setup(64 * 1024);
        let reply = engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();
        assert_eq!(reply.status, OpStatus::Ok);
        assert_eq!(labels(&pool), vec![(GroupKind::Primary, "10.0.0.1:80".to_string())]);
        assert!(pool.read().is_consistent());
    }

    #[test]
    fn test_add_is_idempotent() {
        let (engine, pool) = setup(64 * 1024);
        let op = Operation::add("web", "10.0.0.1:80").with_weight(2);
        engine.execute(&pool, &op).unwrap();
        let before = pool.read().primary().total_weight();

        let reply = engine.execute(&pool, &op).unwrap();
        assert_eq!(reply.status, OpStatus::NotModified);
        assert_eq!(pool.read().len(), 1);
        assert_eq!(pool.read().primary().total_weight(), before);
    }

    #[test]
    fn test_add_inherits_from_first_primary() {
        let (engine, pool) = setup(64 * 1024);
        engine
            .execute(&pool, &Operation::add("web", "10.0.0.1:80").with_max_fails(5).with_fail_timeout(30))
            .unwrap();
        engine.execute(&pool, &Operation::add("web", "10.0.0.2:80")).unwrap();

        let groups = pool.read();
        let attrs = groups.primary().peers()[1].attrs();
        assert_eq!(attrs.weight, 1);
        assert_eq!(attrs.max_fails, 5);
        assert_eq!(attrs.fail_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_backup_conflict() {
        let (engine, pool) = setup(64 * 1024);
        engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();
        let err = engine
            .execute(&pool, &Operation::add("web", "10.0.0.1:80").with_backup(true))
            .unwrap_err();
        assert_eq!(err, OpError::Conflict);
        assert!(pool.read().backup().is_none());
    }

    #[test]
    fn test_remove_last_peer_restores_sentinel() {
        let (engine, pool) = setup(64 * 1024);
        engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();

        let reply = engine.execute(&pool, &Operation::remove("web", "10.0.0.1:80")).unwrap();
        assert_eq!(reply.status, OpStatus::Ok);

        let groups = pool.read();
        assert!(groups.is_placeholder_only());
        assert!(groups.primary().peers()[0].attrs().down);
        assert!(groups.is_consistent());
    }

    #[test]
    fn test_remove_sentinel_is_not_modified() {
        let (engine, pool) = setup(64 * 1024);
        let reply = engine.execute(&pool, &Operation::remove("web", SENTINEL)).unwrap();
        assert_eq!(reply.status, OpStatus::NotModified);
        assert!(pool.read().is_placeholder_only());
    }

    #[test]
    fn test_remove_missing_is_not_modified() {
        let (engine, pool) = setup(64 * 1024);
        engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();
        let reply = engine.execute(&pool, &Operation::remove("web", "10.0.0.9:80")).unwrap();
        assert_eq!(reply.status, OpStatus::NotModified);
    }

    #[test]
    fn test_emptied_backup_group_is_destroyed() {
        let (engine, pool) = setup(64 * 1024);
        engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();
        let used = pool.zone().used();

        engine
            .execute(&pool, &Operation::add("web", "10.0.0.2:80").with_backup(true))
            .unwrap();
        assert_eq!(pool.read().backup().map(PeerGroup::len), Some(1));

        engine.execute(&pool, &Operation::remove("web", "10.0.0.2:80")).unwrap();
        assert!(pool.read().backup().is_none());
        assert_eq!(pool.zone().used(), used);
    }

    #[test]
    fn test_update_weight_adjusts_aggregate() {
        let (engine, pool) = setup(64 * 1024);
        engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();
        engine.execute(&pool, &Operation::add("web", "10.0.0.2:80")).unwrap();
        assert!(!pool.read().primary().is_weighted());

        engine
            .execute(&pool, &Operation::update("web", "10.0.0.1:80").with_weight(5))
            .unwrap();

        let groups = pool.read();
        assert_eq!(groups.primary().total_weight(), 6);
        assert!(groups.primary().is_weighted());
        let attrs = groups.primary().peers()[0].attrs();
        assert_eq!(attrs.effective_weight, 5);
        assert_eq!(attrs.current_weight, 5);
        assert!(groups.is_consistent());
    }

    #[test]
    fn test_update_down_and_up() {
        let (engine, pool) = setup(64 * 1024);
        engine
            .execute(&pool, &Operation::add("web", "10.0.0.1:80").with_max_fails(3))
            .unwrap();

        engine
            .execute(&pool, &Operation::update("web", "10.0.0.1:80").with_down(true))
            .unwrap();
        let attrs = pool.read().primary().peers()[0].attrs();
        assert!(attrs.down);
        assert_eq!(attrs.fails, 3);

        engine
            .execute(&pool, &Operation::update("web", "10.0.0.1:80").with_up(true))
            .unwrap();
        let attrs = pool.read().primary().peers()[0].attrs();
        assert!(!attrs.down);
        assert_eq!(attrs.fails, 0);
    }

    #[test]
    fn test_update_unknown_is_not_found() {
        let (engine, pool) = setup(64 * 1024);
        let err = engine
            .execute(&pool, &Operation::update("web", "10.0.0.1:80").with_down(true))
            .unwrap_err();
        assert_eq!(err, OpError::NotFound);
    }

    #[test]
    fn test_hash_reports_changes() {
        let (engine, pool) = setup(64 * 1024);
        let first = engine.execute(&pool, &Operation::hash("web", None)).unwrap();
        assert_eq!(first.status, OpStatus::Ok);

        let again = engine.execute(&pool, &Operation::hash("web", first.hash)).unwrap();
        assert_eq!(again.status, OpStatus::NotModified);
        assert_eq!(again.hash, first.hash);

        engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();
        let after = engine.execute(&pool, &Operation::hash("web", first.hash)).unwrap();
        assert_eq!(after.status, OpStatus::Ok);
        assert_ne!(after.hash, first.hash);
    }

    #[test]
    fn test_hostname_without_dns_sync_rejected() {
        let (engine, pool) = setup(64 * 1024);
        let err = engine
            .execute(&pool, &Operation::add("web", "api.internal:8080"))
            .unwrap_err();
        assert_eq!(err, OpError::ResolveUnsupported);
    }

    #[test]
    fn test_hostname_pending_with_dns_sync() {
        let (engine, pool) = setup(64 * 1024);
        let reply = engine
            .execute(&pool, &Operation::add("web", "api.internal:8080").with_resolve(true))
            .unwrap();
        assert_eq!(reply.status, OpStatus::Processing);

        let groups = pool.read();
        let peer = &groups.primary().peers()[0];
        assert_eq!(peer.label(), "api.internal:8080");
        assert!(peer.is_unresolved());
        assert!(peer.attrs().down);
    }

    #[test]
    fn test_ipv6_skipped_unless_enabled() {
        let (engine, pool) = setup(64 * 1024);
        let reply = engine.execute(&pool, &Operation::add("web", "[::1]:80")).unwrap();
        assert_eq!(reply.status, OpStatus::NotModified);
        assert!(pool.read().is_placeholder_only());

        let reply = engine
            .execute(&pool, &Operation::add("web", "[::1]:80").with_ipv6(true))
            .unwrap();
        assert_eq!(reply.status, OpStatus::Ok);
        assert_eq!(pool.read().primary().peers()[0].endpoint(), "[::1]:80");
    }

    #[test]
    fn test_no_memory_leaves_pool_untouched() {
        let (engine, pool) = setup(64 * 1024);
        engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();

        // Room for the backup group but not for the record.
        let zone = pool.zone().clone();
        let filler = zone.alloc(zone.available() - GROUP_BLOCK_SIZE).unwrap();
        let used = zone.used();

        let err = engine
            .execute(&pool, &Operation::add("web", "10.0.0.2:80").with_backup(true))
            .unwrap_err();
        assert_eq!(err, OpError::NoMemory);
        assert_eq!(zone.used(), used);
        assert!(pool.read().backup().is_none());
        assert_eq!(pool.read().len(), 1);

        zone.free(filler);
    }

    #[test]
    fn test_partial_add_is_rolled_back() {
        let resolver = Arc::new(StaticResolver::new());
        resolver.set(
            "svc:80",
            vec!["10.0.0.1:80".parse().unwrap(), "10.0.0.2:80".parse().unwrap()],
        );
        let engine = Engine::new(resolver);
        let zone = Arc::new(Zone::new("test", 64 * 1024));
        let pool = PeerPool::new("web", Protocol::Http, zone.clone(), Arc::new(Reclaimer::new())).unwrap();

        // Room for exactly one record of this label.
        let one_record = std::mem::size_of::<PeerRecord>()
            + "svc:80".len()
            + 1
            + "10.0.0.1:80".len()
            + 1
            + std::mem::size_of::<SocketAddr>();
        let filler = zone.alloc(zone.available() - one_record).unwrap();
        let used = zone.used();
        let hash = pool.hash();

        let op = Operation {
            resolve_sync: true,
            ..Operation::add("web", "svc:80")
        };
        let err = engine.execute(&pool, &op).unwrap_err();
        assert_eq!(err, OpError::NoMemory);

        assert_eq!(labels(&pool), vec![(GroupKind::Primary, SENTINEL.to_string())]);
        assert!(pool.read().is_placeholder_only());
        assert!(pool.read().is_consistent());
        assert_eq!(pool.hash(), hash);
        assert_eq!(zone.used(), used);

        zone.free(filler);
        let reply = engine.execute(&pool, &op).unwrap();
        assert_eq!(reply.status, OpStatus::Ok);
        assert_eq!(pool.read().primary().len(), 2);
        assert!(!pool.read().is_placeholder_only());
    }

    #[test]
    fn test_execute_locked_composes() {
        let (engine, pool) = setup(64 * 1024);
        let mut guard = pool.write();
        engine
            .execute_locked(&mut guard, &Operation::add("web", "10.0.0.1:80"))
            .unwrap();
        engine
            .execute_locked(&mut guard, &Operation::add("web", "10.0.0.2:80"))
            .unwrap();
        let err = engine
            .execute_locked(&mut guard, &Operation::sync("web", None))
            .unwrap_err();
        assert!(matches!(err, OpError::BadRequest(_)));
        drop(guard);

        assert_eq!(pool.read().len(), 2);
    }
}
