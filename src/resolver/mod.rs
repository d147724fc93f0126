//! Name resolution for server labels.
//!
//! # Data Flow
//! ```text
//! server label ("host[:port]")
//!     → parse_label (host, port; default port 80)
//!     → IP literal?  → Resolved([addr]) without DNS
//!     → synchronous? → lookup (may block) → Resolved | Failed
//!     → otherwise    → Pending
//! ```
//!
//! The engine never calls a resolver while holding a pool lock.

pub mod fixed;
pub mod system;

use std::net::{IpAddr, SocketAddr};

pub use fixed::StaticResolver;
pub use system::SystemResolver;

/// Port used when a label carries none.
pub const DEFAULT_PORT: u16 = 80;

/// Outcome of resolving one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Vec<SocketAddr>),
    /// Not resolved yet; try again later.
    Pending,
    Failed(String),
}

/// Turns server labels into endpoints.
pub trait Resolver: Send + Sync {
    fn resolve(&self, label: &str, synchronous: bool) -> Resolution;
}

/// Split a label into host and port.
pub fn parse_label(label: &str) -> Result<(String, u16), String> {
    if label.is_empty() {
        return Err("no host".into());
    }

    if let Some(rest) = label.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| "invalid IPv6 address".to_string())?;
        let port = match tail {
            "" => DEFAULT_PORT,
            t => parse_port(t.strip_prefix(':').ok_or("invalid port")?)?,
        };
        return Ok((host.to_string(), port));
    }

    if let Ok(ip) = label.parse::<IpAddr>() {
        return Ok((ip.to_string(), DEFAULT_PORT));
    }

    match label.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.contains(':') => {
            Ok((host.to_string(), parse_port(port)?))
        }
        Some(_) => Err("invalid host".into()),
        None => Ok((label.to_string(), DEFAULT_PORT)),
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err("invalid port".into()),
    }
}

/// The endpoint a label denotes without DNS, if it is an IP literal.
pub fn literal(label: &str) -> Result<Option<SocketAddr>, String> {
    let (host, port) = parse_label(label)?;
    Ok(host.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, port)))
}
