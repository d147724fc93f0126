//! Named upstreams and their pools.
//!
//! # Responsibilities
//! - Build one pool per configured upstream, each with its own zone
//! - Look pools up by (protocol, name)
//! - Carry the per-upstream dynamic settings that shape operations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::schema::{ServerConfig, UpstreamConfig};
use crate::upstream::engine::Engine;
use crate::upstream::group::PeerPool;
use crate::upstream::op::{OpError, OpKind, Operation, PeerParams, Protocol};
use crate::upstream::reclaim::Reclaimer;
use crate::upstream::zone::Zone;

/// Per-upstream dynamic behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Re-resolve interval; `None` disables sync and deferred resolution.
    pub dns_update: Option<Duration>,
    pub ipv6: bool,
    /// Peers added by sync start down.
    pub add_down: bool,
    pub state_file: Option<PathBuf>,
}

impl From<&UpstreamConfig> for UpstreamSettings {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            dns_update: config.dns_update_secs.map(Duration::from_secs),
            ipv6: config.dns_ipv6,
            add_down: config.dns_add_down,
            state_file: config.state_file.as_ref().map(PathBuf::from),
        }
    }
}

/// One named upstream.
#[derive(Debug)]
pub struct Upstream {
    name: String,
    protocol: Protocol,
    pool: Arc<PeerPool>,
    settings: UpstreamSettings,
}

impl Upstream {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn pool(&self) -> &Arc<PeerPool> {
        &self.pool
    }

    pub fn settings(&self) -> &UpstreamSettings {
        &self.settings
    }

    /// Apply the upstream's settings to an operation built elsewhere.
    pub fn prepare(&self, mut op: Operation) -> Operation {
        op.resolve = self.settings.dns_update.is_some();
        op.ipv6 |= self.settings.ipv6;
        if op.kind == OpKind::Sync {
            op.down = self.settings.add_down;
        }
        op
    }
}

impl From<&ServerConfig> for Operation {
    fn from(server: &ServerConfig) -> Self {
        Operation {
            params: PeerParams {
                weight: Some(server.weight),
                max_fails: server.max_fails,
                fail_timeout: server.fail_timeout,
                max_conns: server.max_conns,
            },
            backup: server.backup,
            down: server.down,
            ..Operation::new(String::new(), OpKind::Add).with_server(server.label.clone())
        }
    }
}

/// All upstreams, keyed by protocol and name.
#[derive(Debug, Default)]
pub struct UpstreamRegistry {
    upstreams: DashMap<(Protocol, String), Arc<Upstream>>,
    reclaimer: Arc<Reclaimer>,
}

impl UpstreamRegistry {
    pub fn new(reclaimer: Arc<Reclaimer>) -> Self {
        Self {
            upstreams: DashMap::new(),
            reclaimer,
        }
    }

    /// Build every configured upstream and inject its static servers.
    pub fn from_config(
        configs: &[UpstreamConfig],
        engine: &Engine,
        reclaimer: Arc<Reclaimer>,
    ) -> Result<Self, OpError> {
        let registry = Self::new(reclaimer);

        for config in configs {
            let upstream = registry.register(
                &config.name,
                config.protocol,
                config.zone_size,
                UpstreamSettings::from(config),
            )?;

            for server in &config.servers {
                let op = Operation {
                    upstream: config.name.clone(),
                    protocol: config.protocol,
                    ..Operation::from(server)
                };
                engine.execute(upstream.pool(), &upstream.prepare(op))?;
            }

            tracing::info!(
                upstream = %config.name,
                protocol = %config.protocol,
                servers = config.servers.len(),
                zone_size = config.zone_size,
                dns_update_secs = ?config.dns_update_secs,
                "Upstream registered"
            );
        }

        Ok(registry)
    }

    /// Create an upstream holding only the sentinel.
    pub fn register(
        &self,
        name: &str,
        protocol: Protocol,
        zone_size: usize,
        settings: UpstreamSettings,
    ) -> Result<Arc<Upstream>, OpError> {
        let zone = Arc::new(Zone::new(format!("{protocol}:{name}"), zone_size));
        let pool = PeerPool::new(name, protocol, zone, self.reclaimer.clone())?;
        let upstream = Arc::new(Upstream {
            name: name.to_string(),
            protocol,
            pool: Arc::new(pool),
            settings,
        });
        self.upstreams
            .insert((protocol, name.to_string()), upstream.clone());
        Ok(upstream)
    }

    pub fn get(&self, protocol: Protocol, name: &str) -> Option<Arc<Upstream>> {
        self.upstreams
            .get(&(protocol, name.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Every upstream, sorted by protocol then name.
    pub fn all(&self) -> Vec<Arc<Upstream>> {
        let mut all: Vec<Arc<Upstream>> = self
            .upstreams
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            (a.protocol.to_string(), &a.name).cmp(&(b.protocol.to_string(), &b.name))
        });
        all
    }

    pub fn reclaimer(&self) -> &Arc<Reclaimer> {
        &self.reclaimer
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}
