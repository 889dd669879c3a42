//! # watch-common
//!
//! Shared utilities including configuration, error handling, token verification, and telemetry.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{Claims, JwtService, TokenVerifier};
pub use config::{
    AppConfig, AppSettings, ConfigError, CorsConfig, DatabaseConfig, Environment, JwtConfig,
    NodeConfig, RedisConfig, ServerConfig, SessionConfig, WorkerConfig,
};
pub use error::{AppError, AppResult};
pub use telemetry::{init_tracing, TracingConfig, TracingError};
