//! Persistence file.
//!
//! # Data Flow
//! ```text
//! pool hash changed (tasks::sync)
//!     → render(): one `server ...;` line per distinct label
//!     → write <file>.tmp → rename over <file>
//!
//! startup
//!     → ensure_exists(): absent file gets the sentinel line
//!     → load(): parse every line → ServerLine::to_operation() → Add
//! ```
//!
//! # Format
//! ```text
//! server <label> max_conns=<c> max_fails=<f> fail_timeout=<secs> weight=<w>[ backup];
//! server 0.0.0.0:1 down;
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::upstream::group::{GroupKind, PeerPool, PoolGroups};
use crate::upstream::op::{Operation, PeerParams, Protocol};

/// Written when a pool has no real server.
pub const DEFAULT_LINE: &str = "server 0.0.0.0:1 down;";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// One parsed `server` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLine {
    pub label: String,
    pub params: PeerParams,
    pub backup: bool,
    pub down: bool,
}

impl ServerLine {
    /// The Add that recreates this server.
    pub fn to_operation(&self, upstream: &str, protocol: Protocol) -> Operation {
        Operation {
            params: self.params,
            ..Operation::add(upstream, self.label.clone())
                .with_protocol(protocol)
                .with_backup(self.backup)
                .with_down(self.down)
        }
    }
}

/// Render the pool as state-file text.
pub fn render(groups: &PoolGroups) -> String {
    let mut out = String::new();
    let mut seen: Vec<&str> = Vec::new();

    for (kind, peer) in groups.peers() {
        if peer.is_sentinel() || peer.is_unresolved() || seen.contains(&peer.label()) {
            continue;
        }
        seen.push(peer.label());

        let attrs = peer.attrs();
        let _ = write!(
            out,
            "server {} max_conns={} max_fails={} fail_timeout={} weight={}",
            peer.label(),
            attrs.max_conns,
            attrs.max_fails,
            attrs.fail_timeout.as_secs(),
            attrs.weight,
        );
        if kind == GroupKind::Backup {
            out.push_str(" backup");
        }
        out.push_str(";\n");
    }

    if out.is_empty() {
        out.push_str(DEFAULT_LINE);
        out.push('\n');
    }
    out
}

/// Rewrite `path` with the pool's current servers.
pub fn save(pool: &PeerPool, path: &Path) -> Result<(), StateError> {
    let content = render(&pool.read());
    let tmp = tmp_path(path);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    tracing::debug!(upstream = %pool.upstream(), path = %path.display(), "State file saved");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Create `path` with the default line if it does not exist.
///
/// Returns true when the file was created.
pub fn ensure_exists(path: &Path) -> Result<bool, StateError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{DEFAULT_LINE}\n"))?;
    Ok(true)
}

/// Read every server line from `path`.
pub fn load(path: &Path) -> Result<Vec<ServerLine>, StateError> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            parse_line(line)
                .map_err(|reason| StateError::Parse { line: i + 1, reason })
                .transpose()
        })
        .collect()
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ServerLine>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let body = line
        .strip_suffix(';')
        .ok_or_else(|| "missing ';'".to_string())?;
    let mut tokens = body.split_whitespace();
    if tokens.next() != Some("server") {
        return Err("expected 'server'".into());
    }
    let label = tokens.next().ok_or_else(|| "missing server label".to_string())?;

    let mut server = ServerLine {
        label: label.to_string(),
        params: PeerParams::default(),
        backup: false,
        down: false,
    };

    for token in tokens {
        match token.split_once('=') {
            None if token == "backup" => server.backup = true,
            None if token == "down" => server.down = true,
            Some(("weight", v)) => server.params.weight = Some(number(token, v)?),
            Some(("max_fails", v)) => server.params.max_fails = Some(number(token, v)?),
            Some(("max_conns", v)) => server.params.max_conns = Some(number(token, v)?),
            Some(("fail_timeout", v)) => {
                let v = v.strip_suffix('s').unwrap_or(v);
                server.params.fail_timeout = Some(number(token, v)?);
            }
            _ => return Err(format!("unknown parameter '{token}'")),
        }
    }

    if server.params.weight == Some(0) {
        return Err("weight must be at least 1".into());
    }
    Ok(Some(server))
}

fn number(token: &str, value: &str) -> Result<u32, String> {
    value
        .parse()
        .map_err(|_| format!("invalid number in '{token}'"))
}
