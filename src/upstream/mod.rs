//! Dynamic upstream peer pools.
//!
//! # Data Flow
//! ```text
//! Query interface / Sync driver
//!     → Operation (op.rs)
//!     → Engine (engine.rs) under the pool lock (group.rs)
//!         → Add:    Zone allocation (zone.rs) → PeerRecord (peer.rs)
//!         → Remove: unlink → Reclaimer (reclaim.rs)
//!         → Sync:   Reconciler (sync.rs) → Add / Remove
//!     → OpReply | OpError
//! ```
//!
//! # Design Decisions
//! - One reader/writer lock per pool covers both groups
//! - Each record has its own mutex for attribute updates and the free check
//! - Records move Linked → Unlinked → Freed; only the reclaimer frees

pub mod engine;
pub mod group;
pub mod op;
pub mod peer;
pub mod reclaim;
pub mod sync;
pub mod zone;

pub use engine::Engine;
pub use group::{GroupKind, PeerGroup, PeerPool, PoolGroups, PoolWriteGuard};
pub use op::{OpError, OpKind, OpReply, OpStatus, Operation, PeerParams, Protocol};
pub use peer::{PeerAttrs, PeerConnectionGuard, PeerRecord, PeerState, SENTINEL};
pub use reclaim::{Reclaimer, SweepStats};
pub use zone::Zone;
