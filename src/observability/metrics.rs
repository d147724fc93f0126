//! Metrics collection and exposition.
//!
//! # Metrics
//! - `upstream_ops_total` (counter): operations by upstream, op, outcome
//! - `upstream_peers` (gauge): members by upstream and group
//! - `upstream_sync_total` (counter): reconciler runs by upstream, result
//! - `upstream_reclaim_pending` (gauge): removed peers still referenced
//! - `upstream_zone_used_bytes` (gauge): bytes allocated per zone
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests and the
//!   library never need an exporter

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::upstream::group::PoolGroups;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_operation(upstream: &str, op: &'static str, outcome: &'static str) {
    ::metrics::counter!(
        "upstream_ops_total",
        "upstream" => upstream.to_string(),
        "op" => op,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_pool_size(upstream: &str, groups: &PoolGroups) {
    ::metrics::gauge!("upstream_peers", "upstream" => upstream.to_string(), "group" => "primary")
        .set(groups.primary().len() as f64);
    ::metrics::gauge!("upstream_peers", "upstream" => upstream.to_string(), "group" => "backup")
        .set(groups.backup().map_or(0, |b| b.len()) as f64);
}

pub fn record_sync(upstream: &str, result: &'static str) {
    ::metrics::counter!("upstream_sync_total", "upstream" => upstream.to_string(), "result" => result)
        .increment(1);
}

pub fn record_reclaim_pending(pending: usize) {
    ::metrics::gauge!("upstream_reclaim_pending").set(pending as f64);
}

pub fn record_zone_usage(zone: &str, used: usize) {
    ::metrics::gauge!("upstream_zone_used_bytes", "zone" => zone.to_string()).set(used as f64);
}
