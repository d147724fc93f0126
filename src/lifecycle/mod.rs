//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Build registry → Restore state files → Start tasks → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop tasks → Stop serving → Final reclaimer sweep → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
