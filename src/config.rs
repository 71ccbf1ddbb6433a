//! Process configuration for Hivemind: everything read once at startup
//! from CLI flags and/or a bootstrap config file, as opposed to the
//! hot-reloadable rate limit rules themselves (see
//! [`crate::ratelimit::loader`]).

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Main configuration for the Hivemind service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HivemindConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    #[serde(default)]
    pub redis: RedisConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,

    /// Prometheus metrics exporter address
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    "127.0.0.1:8081".parse().unwrap()
}

fn default_metrics_addr() -> SocketAddr {
    "127.0.0.1:9090".parse().unwrap()
}

/// Rate limiting configuration: where rules live and how shadow mode and
/// reload behave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Directory of per-domain YAML rule files, watched for changes.
    #[serde(default = "default_runtime_config_dir")]
    pub runtime_config_dir: String,

    /// Only keys under this prefix in the runtime snapshot are treated as
    /// rate limit configuration blobs; `None` keeps everything.
    #[serde(default)]
    pub runtime_config_prefix: Option<String>,

    /// Service-wide shadow mode: every over-limit descriptor is recorded
    /// but never promotes the overall verdict to OVER_LIMIT.
    #[serde(default)]
    pub shadow_mode: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            runtime_config_dir: default_runtime_config_dir(),
            runtime_config_prefix: None,
            shadow_mode: false,
        }
    }
}

fn default_runtime_config_dir() -> String {
    "/etc/hivemind/ratelimit".to_string()
}

/// Redis-backed counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL for the default counter store (minute/hour/day limits).
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Optional separate connection URL for per-second limits, isolating
    /// their high write volume from the default store.
    #[serde(default)]
    pub per_second_url: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            per_second_url: None,
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl HivemindConfig {
    /// Load configuration from a file path, falling back to defaults for
    /// anything the file doesn't set.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: HivemindConfig =
            serde_yaml::from_str(&contents).map_err(|e| crate::error::HivemindError::Config(e.to_string()))?;
        Ok(config)
    }
}
