//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals, zone sizes, weights)
//! - Detect duplicate upstreams
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: config → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::UpstreamManagerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listener address '{0}'")]
    ListenerAddress(String),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("upstream '{name}' ({protocol}) is defined more than once")]
    DuplicateUpstream { name: String, protocol: String },

    #[error("upstream name must not be empty")]
    EmptyUpstreamName,

    #[error("upstream '{0}': zone_size must be greater than zero")]
    ZeroZone(String),

    #[error("upstream '{0}': dns_update_secs must be between 1 and 3600")]
    DnsInterval(String),

    #[error("upstream '{0}': server label must not be empty")]
    EmptyLabel(String),

    #[error("upstream '{upstream}': server '{label}' weight must be at least 1")]
    ZeroWeight { upstream: String, label: String },
}

pub fn validate_config(config: &UpstreamManagerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::ListenerAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }
    if config.dynamic.tick_ms == 0 {
        errors.push(ValidationError::ZeroInterval("dynamic.tick_ms"));
    }
    if config.dynamic.reclaim_interval_ms == 0 {
        errors.push(ValidationError::ZeroInterval("dynamic.reclaim_interval_ms"));
    }

    let mut seen = HashSet::new();
    for upstream in &config.upstreams {
        if upstream.name.is_empty() {
            errors.push(ValidationError::EmptyUpstreamName);
        }
        if !seen.insert((upstream.name.as_str(), upstream.protocol)) {
            errors.push(ValidationError::DuplicateUpstream {
                name: upstream.name.clone(),
                protocol: upstream.protocol.to_string(),
            });
        }
        if upstream.zone_size == 0 {
            errors.push(ValidationError::ZeroZone(upstream.name.clone()));
        }
        if let Some(secs) = upstream.dns_update_secs {
            if !(1..=3600).contains(&secs) {
                errors.push(ValidationError::DnsInterval(upstream.name.clone()));
            }
        }
        for server in &upstream.servers {
            if server.label.is_empty() {
                errors.push(ValidationError::EmptyLabel(upstream.name.clone()));
            } else if server.weight == 0 {
                errors.push(ValidationError::ZeroWeight {
                    upstream: upstream.name.clone(),
                    label: server.label.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
