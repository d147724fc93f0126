//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → UpstreamManagerConfig (validated, immutable)
//!     → registry, tasks and admin built from it at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; pools change only through operations
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, DynamicConfig, ListenerConfig, ObservabilityConfig, ServerConfig,
    UpstreamConfig, UpstreamManagerConfig,
};
