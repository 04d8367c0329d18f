//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server applies the backend diff to the registry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the backend set is hot-reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BackendConfig, CircuitConfig, HealthCheckConfig, LimitsConfig, ListenerConfig,
    LoadConfig, LoadSignalKind, ObservabilityConfig, RetryConfig, RouterConfig, TimeoutConfig,
};
