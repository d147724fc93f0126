//! Reconciler.
//!
//! # Data Flow
//! ```text
//! reader lock → snapshot hash + distinct labels (with inherited attributes)
//!     → resolve every label, no lock held
//!     → writer lock → hash moved? → start over
//!     → add resolved endpoints that are missing
//!     → remove peers whose endpoint is no longer wanted
//!     → publish the new hash
//! ```
//!
//! A label that fails to resolve keeps all of its current endpoints.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, warn};

use crate::observability::metrics;
use crate::resolver::Resolution;
use crate::upstream::engine::{add_peer, remove_peers, Engine, PeerSpec};
use crate::upstream::group::{GroupKind, PeerPool, PoolGroups};
use crate::upstream::op::{OpError, OpReply, Operation, PeerParams};
use crate::upstream::peer::{is_reserved, PeerRecord};

/// One distinct label and what it should expand to.
#[derive(Debug)]
struct DesiredServer {
    label: String,
    backup: bool,
    params: PeerParams,
    /// Empty when the label could not be resolved.
    addrs: Vec<SocketAddr>,
}

impl DesiredServer {
    fn wants(&self, peer: &PeerRecord) -> bool {
        self.label == peer.label()
            && (self.addrs.is_empty() || self.addrs.contains(&peer.sockaddr()))
    }
}

/// Converge `pool` on what its labels currently resolve to.
pub(crate) fn reconcile(engine: &Engine, pool: &PeerPool, op: &Operation) -> Result<OpReply, OpError> {
    let upstream = pool.upstream();

    loop {
        let (snapshot, mut desired) = {
            let groups = pool.read();
            (groups.hash(), desired_servers(&groups))
        };

        if op.hash == Some(snapshot) {
            metrics::record_sync(upstream, "unchanged");
            return Ok(OpReply::not_modified().with_hash(snapshot));
        }

        for server in &mut desired {
            server.addrs = match engine.resolver().resolve(&server.label, op.resolve_sync) {
                Resolution::Resolved(addrs) => addrs,
                Resolution::Pending => Vec::new(),
                Resolution::Failed(reason) => {
                    warn!(upstream = %upstream, server = %server.label, reason = %reason, "Failed to resolve");
                    Vec::new()
                }
            };
        }

        let mut guard = pool.write();
        if guard.hash() != snapshot {
            debug!(upstream = %upstream, "Pool changed during resolution, retrying sync");
            continue;
        }

        let mut changes = 0usize;

        for server in &desired {
            let spec = PeerSpec {
                backup: server.backup,
                params: server.params,
                down: op.down,
                ipv6: op.ipv6,
            };
            for addr in &server.addrs {
                if addr.to_string() == server.label {
                    break;
                }
                if add_peer(&mut guard, &server.label, *addr, &spec)? {
                    changes += 1;
                }
            }
        }

        let stale: Vec<(String, String)> = guard
            .peers()
            .filter(|(_, p)| {
                (p.is_ipv6() && !op.ipv6) || !desired.iter().any(|server| server.wants(p))
            })
            .map(|(_, p)| (p.label().to_string(), p.endpoint().to_string()))
            .collect();

        for (label, endpoint) in stale {
            if remove_peers(&mut guard, &label, Some(&endpoint))?.changed() {
                changes += 1;
            }
        }

        let hash = guard.hash();
        drop(guard);

        let reply = if changes > 0 {
            metrics::record_sync(upstream, "changed");
            OpReply::ok()
        } else {
            metrics::record_sync(upstream, "unchanged");
            OpReply::not_modified()
        };
        return Ok(reply.with_hash(hash));
    }
}

/// Distinct labels in dispatch order, skipping the sentinel.
fn desired_servers(groups: &PoolGroups) -> Vec<DesiredServer> {
    let mut servers: Vec<DesiredServer> = Vec::new();

    for (kind, peer) in groups.peers() {
        if is_reserved(peer.label()) || servers.iter().any(|s| s.label == peer.label()) {
            continue;
        }
        let attrs = peer.attrs();
        servers.push(DesiredServer {
            label: peer.label().to_string(),
            backup: kind == GroupKind::Backup,
            params: PeerParams {
                weight: Some(attrs.weight),
                max_fails: Some(attrs.max_fails),
                fail_timeout: Some(fail_timeout_secs(attrs.fail_timeout)),
                max_conns: Some(attrs.max_conns),
            },
            addrs: Vec::new(),
        });
    }

    servers
}

fn fail_timeout_secs(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock};

    use super::*;
    use crate::resolver::{literal, Resolver, StaticResolver};
    use crate::upstream::op::{OpStatus, Protocol};
    use crate::upstream::reclaim::Reclaimer;
    use crate::upstream::zone::Zone;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn setup() -> (Arc<StaticResolver>, Engine, PeerPool) {
        let resolver = Arc::new(StaticResolver::new());
        let engine = Engine::new(resolver.clone());
        let zone = Arc::new(Zone::new("test", 64 * 1024));
        let pool = PeerPool::new("web", Protocol::Http, zone, Arc::new(Reclaimer::new())).unwrap();
        (resolver, engine, pool)
    }

    fn endpoints(pool: &PeerPool) -> Vec<String> {
        pool.read().peers().map(|(_, p)| p.endpoint().to_string()).collect()
    }

    #[test]
    fn test_pending_placeholder_replaced_after_resolution() {
        let (resolver, engine, pool) = setup();
        engine
            .execute(&pool, &Operation::add("web", "api.internal:8080").with_resolve(true))
            .unwrap();
        assert_eq!(endpoints(&pool), vec!["0.0.0.0:1"]);

        resolver.set("api.internal:8080", vec![addr("10.0.0.7:8080")]);
        let reply = engine.execute(&pool, &Operation::sync("web", None)).unwrap();
        assert_eq!(reply.status, OpStatus::Ok);
        assert_eq!(endpoints(&pool), vec!["10.0.0.7:8080"]);
        assert!(pool.read().is_consistent());
    }

    #[test]
    fn test_failed_resolution_keeps_peers() {
        let (resolver, engine, pool) = setup();
        resolver.set("api.internal:8080", vec![addr("10.0.0.1:8080")]);
        engine
            .execute(
                &pool,
                &Operation::add("web", "api.internal:8080").with_resolve(true),
            )
            .unwrap();
        engine.execute(&pool, &Operation::sync("web", None)).unwrap();
        assert_eq!(endpoints(&pool), vec!["10.0.0.1:8080"]);

        resolver.remove("api.internal:8080");
        let reply = engine.execute(&pool, &Operation::sync("web", None)).unwrap();
        assert_eq!(reply.status, OpStatus::NotModified);
        assert_eq!(endpoints(&pool), vec!["10.0.0.1:8080"]);
    }

    #[test]
    fn test_known_hash_short_circuits() {
        let (_, engine, pool) = setup();
        engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();
        let hash = pool.hash();

        let reply = engine.execute(&pool, &Operation::sync("web", Some(hash))).unwrap();
        assert_eq!(reply.status, OpStatus::NotModified);
        assert_eq!(reply.hash, Some(hash));
    }

    #[test]
    fn test_literal_labels_are_stable() {
        let (_, engine, pool) = setup();
        engine.execute(&pool, &Operation::add("web", "10.0.0.1:80")).unwrap();
        engine
            .execute(&pool, &Operation::add("web", "10.0.0.2:80").with_backup(true))
            .unwrap();

        let reply = engine.execute(&pool, &Operation::sync("web", None)).unwrap();
        assert_eq!(reply.status, OpStatus::NotModified);
        assert_eq!(endpoints(&pool), vec!["10.0.0.1:80", "10.0.0.2:80"]);
    }

    #[test]
    fn test_added_peers_inherit_label_attributes() {
        let (resolver, engine, pool) = setup();
        resolver.set("svc:80", vec![addr("10.0.0.1:80")]);
        engine
            .execute(
                &pool,
                &Operation::add("web", "svc:80").with_resolve(true).with_weight(4),
            )
            .unwrap();
        engine.execute(&pool, &Operation::sync("web", None)).unwrap();

        resolver.set("svc:80", vec![addr("10.0.0.1:80"), addr("10.0.0.2:80")]);
        let sync = Operation {
            down: true,
            ..Operation::sync("web", None)
        };
        engine.execute(&pool, &sync).unwrap();

        let groups = pool.read();
        let added = &groups.primary().peers()[1];
        assert_eq!(added.endpoint(), "10.0.0.2:80");
        let attrs = added.attrs();
        assert_eq!(attrs.weight, 4);
        assert!(attrs.down);
        assert_eq!(groups.primary().total_weight(), 8);
    }

    /// Answers `svc:80` and, on the first synchronous lookup, adds a peer to
    /// the pool while the reconciler holds no lock.
    struct RacingResolver {
        pool: OnceLock<Arc<PeerPool>>,
        side: Engine,
        calls: AtomicUsize,
    }

    impl Resolver for RacingResolver {
        fn resolve(&self, label: &str, synchronous: bool) -> Resolution {
            if let Ok(Some(addr)) = literal(label) {
                return Resolution::Resolved(vec![addr]);
            }
            if !synchronous {
                return Resolution::Pending;
            }
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let pool = self.pool.get().unwrap();
                self.side
                    .execute(pool, &Operation::add("web", "10.9.9.9:80"))
                    .unwrap();
            }
            Resolution::Resolved(vec![addr("10.0.0.7:80")])
        }
    }

    #[test]
    fn test_sync_restarts_when_pool_changes_during_resolution() {
        let resolver = Arc::new(RacingResolver {
            pool: OnceLock::new(),
            side: Engine::new(Arc::new(StaticResolver::new())),
            calls: AtomicUsize::new(0),
        });
        let engine = Engine::new(resolver.clone());
        let zone = Arc::new(Zone::new("test", 64 * 1024));
        let pool = Arc::new(
            PeerPool::new("web", Protocol::Http, zone, Arc::new(Reclaimer::new())).unwrap(),
        );
        resolver.pool.set(pool.clone()).unwrap();

        engine
            .execute(&pool, &Operation::add("web", "svc:80").with_resolve(true))
            .unwrap();

        let reply = engine.execute(&pool, &Operation::sync("web", None)).unwrap();
        assert_eq!(reply.status, OpStatus::Ok);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
        assert_eq!(reply.hash, Some(pool.hash()));

        let members: Vec<(String, String)> = pool
            .read()
            .peers()
            .map(|(_, p)| (p.label().to_string(), p.endpoint().to_string()))
            .collect();
        assert_eq!(
            members,
            vec![
                ("10.9.9.9:80".to_string(), "10.9.9.9:80".to_string()),
                ("svc:80".to_string(), "10.0.0.7:80".to_string()),
            ]
        );
        assert!(pool.read().is_consistent());

        let reply = engine.execute(&pool, &Operation::sync("web", None)).unwrap();
        assert_eq!(reply.status, OpStatus::NotModified);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }
}
