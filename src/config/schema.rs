//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::upstream::op::Protocol;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamManagerConfig {
    /// Query interface listener.
    pub listener: ListenerConfig,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,

    /// Background task timing.
    pub dynamic: DynamicConfig,

    /// Upstream definitions.
    pub upstreams: Vec<UpstreamConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8081").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Query interface authentication.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token. Requests are not authenticated when unset.
    pub api_key: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Driver and reclaimer timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DynamicConfig {
    /// Sync driver tick in milliseconds.
    pub tick_ms: u64,

    /// Reclaimer sweep interval in milliseconds.
    pub reclaim_interval_ms: u64,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            reclaim_interval_ms: 1000,
        }
    }
}

/// One named upstream and its initial servers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    pub name: String,

    #[serde(default)]
    pub protocol: Protocol,

    /// Zone budget in bytes.
    #[serde(default = "default_zone_size")]
    pub zone_size: usize,

    /// Re-resolve every label at this interval (seconds). Also enables
    /// adding hostnames before they resolve.
    #[serde(default)]
    pub dns_update_secs: Option<u64>,

    /// Accept IPv6 endpoints.
    #[serde(default)]
    pub dns_ipv6: bool,

    /// Peers added by sync start down.
    #[serde(default)]
    pub dns_add_down: bool,

    /// Persistence file rewritten whenever the pool changes.
    #[serde(default)]
    pub state_file: Option<String>,

    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

pub const DEFAULT_ZONE_SIZE: usize = 256 * 1024;

fn default_zone_size() -> usize {
    DEFAULT_ZONE_SIZE
}

/// A statically configured server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// `host[:port]` or an IP literal.
    pub label: String,

    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default)]
    pub max_fails: Option<u32>,

    /// Seconds.
    #[serde(default)]
    pub fail_timeout: Option<u32>,

    #[serde(default)]
    pub max_conns: Option<u32>,

    #[serde(default)]
    pub backup: bool,

    #[serde(default)]
    pub down: bool,
}

fn default_weight() -> u32 {
    1
}
