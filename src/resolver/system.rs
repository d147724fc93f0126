//! Resolver backed by the operating system.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::resolver::{literal, parse_label, Resolution, Resolver};

/// Uses `getaddrinfo` through [`ToSocketAddrs`]; blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolver for SystemResolver {
    fn resolve(&self, label: &str, synchronous: bool) -> Resolution {
        match literal(label) {
            Ok(Some(addr)) => return Resolution::Resolved(vec![addr]),
            Ok(None) => {}
            Err(e) => return Resolution::Failed(e),
        }

        if !synchronous {
            return Resolution::Pending;
        }

        let (host, port) = match parse_label(label) {
            Ok(parts) => parts,
            Err(e) => return Resolution::Failed(e),
        };

        match (host.as_str(), port).to_socket_addrs() {
            Ok(addrs) => {
                let mut resolved: Vec<SocketAddr> = Vec::new();
                for addr in addrs {
                    if !resolved.contains(&addr) {
                        resolved.push(addr);
                    }
                }
                if resolved.is_empty() {
                    Resolution::Failed("failed to resolve".into())
                } else {
                    Resolution::Resolved(resolved)
                }
            }
            Err(e) => {
                tracing::debug!(server = %label, error = %e, "Lookup failed");
                Resolution::Failed("failed to resolve".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_skip_dns() {
        let r = SystemResolver::new();
        assert_eq!(
            r.resolve("127.0.0.1:8080", false),
            Resolution::Resolved(vec!["127.0.0.1:8080".parse().unwrap()])
        );
    }

    #[test]
    fn test_hostname_pending_when_async() {
        let r = SystemResolver::new();
        assert_eq!(r.resolve("backend.internal:80", false), Resolution::Pending);
    }

    #[test]
    fn test_invalid_label_fails() {
        let r = SystemResolver::new();
        assert!(matches!(r.resolve("host:notaport", true), Resolution::Failed(_)));
    }
}
