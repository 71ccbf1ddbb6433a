//! The service facade: owns the live configuration pointer and turns
//! validated requests into evaluated, shadow-adjusted responses.
//!
//! This is the transport-independent core the gRPC adapter wraps. It
//! never speaks protobuf; `src/grpc/service.rs` translates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tracing::{info, warn};

use crate::error::{BackendError, RateLimitError, ServiceError};
use crate::metrics;
use crate::ratelimit::clock::Clock;
use crate::ratelimit::evaluator::{self, DescriptorStatus, Verdict};
use crate::ratelimit::model::{Configuration, DescriptorEntry};
use crate::ratelimit::store::CounterStoreRouter;

/// One descriptor as submitted in a request: an ordered list of key/value
/// entries, outermost to innermost.
pub type RequestDescriptor = Vec<(String, String)>;

/// Transport-independent request for `should_rate_limit`.
#[derive(Debug, Clone)]
pub struct RateLimitServiceRequest {
    pub domain: String,
    pub descriptors: Vec<RequestDescriptor>,
    pub hits_addend: u32,
}

/// Transport-independent response: the overall verdict plus one status
/// per submitted descriptor, in the same order.
#[derive(Debug, Clone)]
pub struct RateLimitServiceResponse {
    pub overall: Verdict,
    pub statuses: Vec<DescriptorStatus>,
}

/// Owns the hot-reloadable [`Configuration`] pointer, the counter store
/// router, and the clock. Cheap to clone (everything inside is an `Arc`
/// or `Copy`), so handlers can hold their own copy.
#[derive(Clone)]
pub struct RateLimitService {
    config: Arc<ArcSwapOption<Configuration>>,
    store: Arc<CounterStoreRouter>,
    clock: Arc<dyn Clock>,
    shadow_mode: bool,
}

impl RateLimitService {
    pub fn new(store: CounterStoreRouter, clock: Arc<dyn Clock>, shadow_mode: bool) -> Self {
        Self {
            config: Arc::new(ArcSwapOption::empty()),
            store: Arc::new(store),
            clock,
            shadow_mode,
        }
    }

    /// Handle shared by the reloader to publish a freshly loaded
    /// configuration. Total replacement: no merge with the previous one.
    pub fn config_handle(&self) -> Arc<ArcSwapOption<Configuration>> {
        self.config.clone()
    }

    pub fn has_configuration(&self) -> bool {
        self.config.load().is_some()
    }

    /// Evaluate a request end to end: validate, resolve, evaluate,
    /// aggregate the overall verdict under shadow-mode rules, and record
    /// the request-latency metric unconditionally regardless of outcome.
    pub async fn should_rate_limit(
        &self,
        request: RateLimitServiceRequest,
    ) -> Result<RateLimitServiceResponse, RateLimitError> {
        let started = Instant::now();
        let result = self.should_rate_limit_inner(request).await;

        metrics::record_request_latency(started.elapsed());
        if let Err(e) = &result {
            metrics::record_service_error(e.metric_type());
        }

        result
    }

    async fn should_rate_limit_inner(
        &self,
        request: RateLimitServiceRequest,
    ) -> Result<RateLimitServiceResponse, RateLimitError> {
        if request.domain.is_empty() {
            return Err(ServiceError::EmptyDomain.into());
        }
        if request.descriptors.is_empty() {
            return Err(ServiceError::EmptyDescriptors.into());
        }

        let config = self.config.load_full().ok_or(ServiceError::NoConfiguration)?;

        let entries: Vec<Vec<DescriptorEntry>> = request
            .descriptors
            .iter()
            .map(|pairs| {
                pairs
                    .iter()
                    .map(|(key, value)| DescriptorEntry {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .collect();

        let limits = entries
            .iter()
            .map(|pairs| config.resolve(&request.domain, pairs).cloned())
            .collect::<Vec<_>>();

        let statuses = evaluator::evaluate(
            self.store.as_ref(),
            self.clock.as_ref(),
            &request.domain,
            &request.descriptors,
            &limits,
            request.hits_addend,
        )
        .await
        .map_err(RateLimitError::from)?;

        let overall = self.aggregate(&request.descriptors, &statuses);

        Ok(RateLimitServiceResponse { overall, statuses })
    }

    /// Combine per-descriptor verdicts into the overall one, applying
    /// shadow mode once per over-limit descriptor: service-wide and
    /// per-limit flags are OR'd, and a shadowed descriptor is recorded but
    /// never promotes the overall verdict to `OverLimit`.
    fn aggregate(&self, descriptors: &[RequestDescriptor], statuses: &[DescriptorStatus]) -> Verdict {
        let mut overall = Verdict::Ok;

        for (descriptor, status) in descriptors.iter().zip(statuses.iter()) {
            if status.verdict != Verdict::OverLimit {
                continue;
            }

            let limit_shadow = status.limit.as_ref().map(|l| l.shadow_mode).unwrap_or(false);
            let shadowed = self.shadow_mode || limit_shadow;

            let Some(limit) = &status.limit else {
                continue;
            };
            let (key, value) = last_entry(descriptor);

            if shadowed {
                metrics::record_shadow_block(key, value, limit.requests_per_unit, limit.unit);
                continue;
            }

            metrics::record_limited(key, value, limit.requests_per_unit, limit.unit);
            overall = Verdict::OverLimit;
        }

        overall
    }
}

fn last_entry(descriptor: &RequestDescriptor) -> (&str, &str) {
    descriptor
        .last()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .unwrap_or(("", ""))
}

/// Health roll-up: pings the counter store(s) behind the router. Used by
/// the gRPC server's health service and by startup readiness checks.
pub async fn check_backend_health(store: &CounterStoreRouter) -> Result<(), BackendError> {
    store.ping().await
}

/// Apply a freshly-loaded configuration, logging and metric-recording the
/// outcome either way. Called by the reloader after every successful
/// [`crate::ratelimit::loader::load`].
pub fn publish_configuration(handle: &ArcSwapOption<Configuration>, config: Configuration) {
    let domain_count = config.domain_count();
    handle.store(Some(Arc::new(config)));
    metrics::record_config_load_success(domain_count);
    info!(domain_count, "published new rate limit configuration");
}

pub fn note_configuration_load_failure(source: &str, message: &str) {
    warn!(source, message, "rejected runtime configuration reload");
    metrics::record_config_load_error();
}

/// Duration a reloader should back off after a transient watcher error
/// before re-subscribing, mirrored from spec §4.6.
pub const WATCHER_RETRY_BACKOFF: Duration = Duration::from_secs(5);
