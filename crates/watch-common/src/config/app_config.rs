//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: ServerConfig,
    pub node: NodeConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
    pub session: SessionConfig,
    pub workers: WorkerConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Listen address of the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Identity of this gateway process within the fleet
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Stable node id, used for the private `gateway:{id}` channel and session ownership
    pub id: String,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: u32,
    /// Received messages buffered per node before slow consumers start lagging
    #[serde(default = "default_pubsub_buffer")]
    pub pubsub_buffer: usize,
}

/// Token verification configuration
///
/// Exactly one of `secret` (HS256) and `public_key_path` (RS256 PEM) is used; the
/// public key wins when both are set.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub public_key_path: Option<String>,
}

/// Allowed `Origin` values for socket upgrades, empty allows all
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    #[must_use]
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|origin| self.allowed_origins.iter().any(|o| o == origin))
    }
}

/// Session lifetime and keepalive timings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Grace period a disconnected session can be reclaimed in
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
    /// Idle time before a socket is pinged
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    /// Silence after which a socket is dropped
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,
}

impl SessionConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    #[must_use]
    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            keepalive_interval_secs: default_keepalive_interval(),
            keepalive_timeout_secs: default_keepalive_timeout(),
        }
    }
}

/// Background worker pool sizing
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_pool_size")]
    pub pool_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_worker_pool_size(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "watch-gateway".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_redis_max_connections() -> u32 {
    10
}

fn default_pubsub_buffer() -> usize {
    4096
}

fn default_session_ttl() -> u64 {
    900 // 15 minutes
}

fn default_keepalive_interval() -> u64 {
    5
}

fn default_keepalive_timeout() -> u64 {
    8
}

fn default_worker_pool_size() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get) * 64
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let jwt = JwtConfig {
            secret: non_empty_var("JWT_SECRET"),
            public_key_path: non_empty_var("JWT_PUBLIC_KEY_PATH"),
        };
        if jwt.secret.is_none() && jwt.public_key_path.is_none() {
            return Err(ConfigError::MissingVar("JWT_SECRET"));
        }

        let session = SessionConfig {
            ttl_secs: parse_var("SESSION_TTL_SECS").unwrap_or_else(default_session_ttl),
            keepalive_interval_secs: parse_var("KEEPALIVE_INTERVAL_SECS")
                .unwrap_or_else(default_keepalive_interval),
            keepalive_timeout_secs: parse_var("KEEPALIVE_TIMEOUT_SECS")
                .unwrap_or_else(default_keepalive_timeout),
        };
        if session.keepalive_timeout_secs <= session.keepalive_interval_secs {
            return Err(ConfigError::InvalidValue(
                "KEEPALIVE_TIMEOUT_SECS",
                "must be greater than KEEPALIVE_INTERVAL_SECS".to_string(),
            ));
        }

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            gateway: ServerConfig {
                host: env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host()),
                port: parse_var("GATEWAY_PORT").ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?,
            },
            node: NodeConfig {
                id: non_empty_var("NODE_ID").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(default_max_connections),
                min_connections: parse_var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(default_min_connections),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").map_err(|_| ConfigError::MissingVar("REDIS_URL"))?,
                max_connections: parse_var("REDIS_MAX_CONNECTIONS")
                    .unwrap_or_else(default_redis_max_connections),
                pubsub_buffer: parse_var("REDIS_PUBSUB_BUFFER")
                    .filter(|size: &usize| *size > 0)
                    .unwrap_or_else(default_pubsub_buffer),
            },
            jwt,
            cors: CorsConfig {
                allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                    .ok()
                    .map(|s| {
                        s.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            session,
            workers: WorkerConfig {
                pool_size: parse_var("WORKER_POOL_SIZE").unwrap_or_else(default_worker_pool_size),
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
