//! In-memory resolver with operator-supplied answers.

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::RwLock;

use crate::resolver::{literal, Resolution, Resolver};

/// Answers lookups from a table. Labels missing from the table fail to
/// resolve; IP literals resolve to themselves.
#[derive(Debug, Default)]
pub struct StaticResolver {
    answers: RwLock<HashMap<String, Vec<SocketAddr>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the answer for `label`, replacing any previous one.
    pub fn set(&self, label: impl Into<String>, addrs: Vec<SocketAddr>) {
        self.answers.write().insert(label.into(), addrs);
    }

    pub fn remove(&self, label: &str) {
        self.answers.write().remove(label);
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, label: &str, synchronous: bool) -> Resolution {
        match literal(label) {
            Ok(Some(addr)) => return Resolution::Resolved(vec![addr]),
            Ok(None) => {}
            Err(e) => return Resolution::Failed(e),
        }

        if !synchronous {
            return Resolution::Pending;
        }

        match self.answers.read().get(label) {
            Some(addrs) if !addrs.is_empty() => Resolution::Resolved(addrs.clone()),
            _ => Resolution::Failed("failed to resolve".into()),
        }
    }
}
