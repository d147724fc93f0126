//! Startup orchestration.
//!
//! # Responsibilities
//! - Restore every upstream's persisted servers before traffic starts
//! - Create missing state files with the sentinel line
//!
//! # Design Decisions
//! - Fail fast: an unreadable or malformed state file is fatal
//! - A line the engine rejects is logged and skipped

use crate::registry::UpstreamRegistry;
use crate::state::{self, StateError};
use crate::upstream::engine::Engine;

/// Inject each upstream's state file as Add operations.
///
/// Returns the number of servers restored.
pub fn restore_state_files(registry: &UpstreamRegistry, engine: &Engine) -> Result<usize, StateError> {
    let mut restored = 0;

    for upstream in registry.all() {
        let Some(path) = upstream.settings().state_file.as_deref() else {
            continue;
        };

        if state::ensure_exists(path)? {
            tracing::info!(upstream = %upstream.name(), path = %path.display(), "Created state file");
            continue;
        }

        for line in state::load(path)? {
            let op = upstream.prepare(line.to_operation(upstream.name(), upstream.protocol()));
            match engine.execute(upstream.pool(), &op) {
                Ok(reply) if reply.changed() => restored += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    upstream = %upstream.name(),
                    server = %line.label,
                    error = %e,
                    "Skipping persisted server"
                ),
            }
        }

        tracing::info!(upstream = %upstream.name(), path = %path.display(), "State file restored");
    }

    Ok(restored)
}
