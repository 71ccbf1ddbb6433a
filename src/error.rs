//! Error types for the Hivemind rate limiting core.
//!
//! Three kinds matter on the hot path: [`ServiceError`] (request-level
//! validation), [`BackendError`] (counter store faults), and [`ConfigError`]
//! (structural problems in a loaded configuration blob, never surfaced to a
//! caller). [`HivemindError`] is the umbrella used at process bootstrap.

use thiserror::Error;

/// A structured failure from loading a configuration blob.
///
/// Never surfaced on the request path: the reloader logs it, bumps
/// `config_load_error`, and leaves the previously-loaded configuration live.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("config error in {source}: {message}")]
pub struct ConfigError {
    /// Name of the offending (name, body) blob, e.g. a file name.
    pub source: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }
}

/// Counter-store I/O, protocol, or cancellation fault.
///
/// The evaluator never swallows this: it aborts the whole evaluation and
/// surfaces it, so partial pipeline results never leak into a response.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("counter store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("counter store call cancelled or timed out")]
    Cancelled,
}

/// Request-level validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("domain is required")]
    EmptyDomain,

    #[error("at least one descriptor is required")]
    EmptyDescriptors,

    #[error("no rate limit configuration loaded")]
    NoConfiguration,
}

/// Top-level error for the `ShouldRateLimit` operation.
///
/// Classifies into the two request-path kinds of the error design so
/// callers (the gRPC adapter, metrics) can dispatch on `metric_type()`
/// without matching the inner variants.
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl RateLimitError {
    /// Stable metric label: `"service"` or `"redis"`.
    pub fn metric_type(&self) -> &'static str {
        match self {
            RateLimitError::Service(_) => "service",
            RateLimitError::Backend(_) => "redis",
        }
    }
}

/// Main error type for Hivemind process-level operations (bootstrap, I/O).
#[derive(Error, Debug)]
pub enum HivemindError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limiting errors surfaced on the request path
    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for HivemindError {
    fn from(e: ConfigError) -> Self {
        HivemindError::Config(e.to_string())
    }
}

/// Result type alias for Hivemind operations.
pub type Result<T> = std::result::Result<T, HivemindError>;
