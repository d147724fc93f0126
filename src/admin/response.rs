//! Peer list rendering.

use std::fmt::Write as _;

use crate::upstream::group::{GroupKind, PoolGroups};

/// One `server ...;` line per member, primary first.
pub fn render_peers(groups: &PoolGroups, verbose: bool) -> String {
    let mut out = String::new();

    for (kind, peer) in groups.peers() {
        let attrs = peer.attrs();
        let _ = write!(out, "server {} addr={}", peer.label(), peer.endpoint());
        if verbose {
            let _ = write!(
                out,
                " weight={} max_fails={} fail_timeout={} max_conns={} conns={}",
                attrs.weight,
                attrs.max_fails,
                attrs.fail_timeout.as_secs(),
                attrs.max_conns,
                attrs.conns,
            );
        }
        if attrs.down {
            out.push_str(" down");
        }
        if kind == GroupKind::Backup {
            out.push_str(" backup");
        }
        out.push_str(";\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::resolver::StaticResolver;
    use crate::upstream::engine::Engine;
    use crate::upstream::group::PeerPool;
    use crate::upstream::op::{Operation, Protocol};
    use crate::upstream::reclaim::Reclaimer;
    use crate::upstream::zone::Zone;

    #[test]
    fn test_render_formats() {
        let zone = Arc::new(Zone::new("test", 64 * 1024));
        let pool = PeerPool::new("web", Protocol::Http, zone, Arc::new(Reclaimer::new())).unwrap();
        assert_eq!(
            render_peers(&pool.read(), false),
            "server 0.0.0.0:1 addr=0.0.0.0:1 down;\n"
        );

        let engine = Engine::new(Arc::new(StaticResolver::new()));
        engine
            .execute(&pool, &Operation::add("web", "10.0.0.1:80").with_weight(2))
            .unwrap();
        engine
            .execute(&pool, &Operation::add("web", "10.0.0.2:80").with_backup(true).with_down(true))
            .unwrap();

        assert_eq!(
            render_peers(&pool.read(), false),
            "server 10.0.0.1:80 addr=10.0.0.1:80;\n\
             server 10.0.0.2:80 addr=10.0.0.2:80 down backup;\n"
        );
        assert_eq!(
            render_peers(&pool.read(), true),
            "server 10.0.0.1:80 addr=10.0.0.1:80 weight=2 max_fails=1 fail_timeout=10 max_conns=0 conns=0;\n\
             server 10.0.0.2:80 addr=10.0.0.2:80 weight=1 max_fails=1 fail_timeout=10 max_conns=0 conns=0 down backup;\n"
        );
    }
}
