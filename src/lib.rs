//! Dynamic upstream pool manager library.

// Core subsystems
pub mod config;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod upstream;

// Query interface
pub mod admin;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod tasks;

pub use config::schema::UpstreamManagerConfig;
pub use lifecycle::Shutdown;
pub use registry::{Upstream, UpstreamRegistry};
pub use upstream::{Engine, OpError, OpReply, OpStatus, Operation};
