//! Operation records, statuses and errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which family of pools an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Stream,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Stream => write!(f, "stream"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpKind {
    #[default]
    List,
    Add,
    Remove,
    Update,
    Sync,
    Hash,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::List => "list",
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Update => "update",
            OpKind::Sync => "sync",
            OpKind::Hash => "hash",
        }
    }
}

/// Peer attributes an operation sets. `None` leaves the field alone
/// (update) or inherits it (add).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerParams {
    pub weight: Option<u32>,
    pub max_fails: Option<u32>,
    /// Seconds.
    pub fail_timeout: Option<u32>,
    pub max_conns: Option<u32>,
}

impl PeerParams {
    pub fn is_empty(&self) -> bool {
        self.weight.is_none()
            && self.max_fails.is_none()
            && self.fail_timeout.is_none()
            && self.max_conns.is_none()
    }
}

/// A request against one pool.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    pub upstream: String,
    pub kind: OpKind,
    pub protocol: Protocol,
    /// Server label, or a label/endpoint filter.
    pub server: Option<String>,
    /// Endpoint filter.
    pub peer: Option<String>,
    pub backup: bool,
    pub params: PeerParams,
    pub up: bool,
    pub down: bool,
    pub verbose: bool,
    /// Hostnames may be added before they resolve (upstream has DNS sync).
    pub resolve: bool,
    /// Resolve hostnames in the calling thread.
    pub resolve_sync: bool,
    /// Accept IPv6 endpoints.
    pub ipv6: bool,
    /// Previously published change-hash, for Hash and Sync.
    pub hash: Option<u64>,
}

impl Operation {
    pub fn new(upstream: impl Into<String>, kind: OpKind) -> Self {
        Self {
            upstream: upstream.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn add(upstream: impl Into<String>, server: impl Into<String>) -> Self {
        Self::new(upstream, OpKind::Add).with_server(server)
    }

    pub fn remove(upstream: impl Into<String>, server: impl Into<String>) -> Self {
        Self::new(upstream, OpKind::Remove).with_server(server)
    }

    pub fn update(upstream: impl Into<String>, server: impl Into<String>) -> Self {
        Self::new(upstream, OpKind::Update).with_server(server)
    }

    pub fn sync(upstream: impl Into<String>, known_hash: Option<u64>) -> Self {
        Self {
            hash: known_hash,
            resolve_sync: true,
            ..Self::new(upstream, OpKind::Sync)
        }
    }

    pub fn hash(upstream: impl Into<String>, known_hash: Option<u64>) -> Self {
        Self {
            hash: known_hash,
            ..Self::new(upstream, OpKind::Hash)
        }
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.params.weight = Some(weight);
        self
    }

    pub fn with_max_fails(mut self, max_fails: u32) -> Self {
        self.params.max_fails = Some(max_fails);
        self
    }

    pub fn with_fail_timeout(mut self, secs: u32) -> Self {
        self.params.fail_timeout = Some(secs);
        self
    }

    pub fn with_max_conns(mut self, max_conns: u32) -> Self {
        self.params.max_conns = Some(max_conns);
        self
    }

    pub fn with_down(mut self, down: bool) -> Self {
        self.down = down;
        self
    }

    pub fn with_up(mut self, up: bool) -> Self {
        self.up = up;
        self
    }

    pub fn with_resolve(mut self, resolve: bool) -> Self {
        self.resolve = resolve;
        self
    }

    pub fn with_ipv6(mut self, ipv6: bool) -> Self {
        self.ipv6 = ipv6;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// The server argument, required by Add, Remove and Update.
    pub(crate) fn require_server(&self) -> Result<&str, OpError> {
        self.server
            .as_deref()
            .ok_or_else(|| OpError::BadRequest("'server' argument required".into()))
    }
}

/// Outcome of a successful operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// Something changed (or, for List, the request was served).
    Ok,
    /// Request already satisfied; nothing changed.
    NotModified,
    /// Accepted, pending DNS resolution.
    Processing,
}

impl OpStatus {
    /// HTTP status reported by the query interface.
    pub fn status_code(&self) -> u16 {
        match self {
            OpStatus::Ok => 200,
            OpStatus::NotModified => 304,
            OpStatus::Processing => 202,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Ok => "ok",
            OpStatus::NotModified => "not_modified",
            OpStatus::Processing => "processing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpReply {
    pub status: OpStatus,
    /// Pool change-hash after the operation (Hash and Sync only).
    pub hash: Option<u64>,
    pub detail: Option<&'static str>,
}

impl OpReply {
    pub fn ok() -> Self {
        Self { status: OpStatus::Ok, hash: None, detail: None }
    }

    pub fn not_modified() -> Self {
        Self { status: OpStatus::NotModified, hash: None, detail: None }
    }

    pub(crate) fn with_hash(mut self, hash: u64) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn changed(&self) -> bool {
        self.status == OpStatus::Ok
    }
}

/// Errors reported by the operation engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OpError {
    /// Malformed or contradictory request.
    #[error("{0}")]
    BadRequest(String),

    /// Label already exists in the other group.
    #[error("can't change server type (primary<->backup)")]
    Conflict,

    #[error("server or peer is not found")]
    NotFound,

    /// The zone could not satisfy an allocation.
    #[error("no shared memory")]
    NoMemory,

    #[error("{0}")]
    ResolveFailed(String),

    /// A hostname was given to an upstream without DNS sync.
    #[error("domain names are supported only for upstreams with 'dns_update' directive")]
    ResolveUnsupported,

    #[error("upstream is not found")]
    UpstreamNotFound,
}

impl OpError {
    /// HTTP status reported by the query interface.
    pub fn status_code(&self) -> u16 {
        match self {
            OpError::BadRequest(_) => 400,
            OpError::Conflict => 412,
            OpError::NotFound => 400,
            OpError::NoMemory => 500,
            OpError::ResolveFailed(_) => 500,
            OpError::ResolveUnsupported => 400,
            OpError::UpstreamNotFound => 404,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_code() == 500
    }
}
