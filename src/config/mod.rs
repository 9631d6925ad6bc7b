//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AccessLevel, CsrfConfig, DataAccessConfig, Environment, GatewayConfig, IdentityConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig, RateLimitRule, RouteConfig,
    TimeoutConfig, UpstreamConfig,
};
