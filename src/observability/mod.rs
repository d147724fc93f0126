//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! engine, reconciler, reclaimer, zone
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
