//! Background tasks.
//!
//! # Data Flow
//! ```text
//! tokio interval tick
//!     → sync.rs:    per upstream, Sync or ComputeHash → save state file on change
//!     → reclaim.rs: Reclaimer::sweep()
//! shutdown broadcast
//!     → both loops exit
//! ```

pub mod reclaim;
pub mod sync;

pub use reclaim::ReclaimSweeper;
pub use sync::SyncDriver;
