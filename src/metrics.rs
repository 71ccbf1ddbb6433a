//! Observability surface: the stable metric names and label shapes the
//! evaluator, facade, and reloader emit through, via the `metrics` facade
//! crate (wired to Prometheus at the process boundary in `main.rs`).

use std::time::Duration;

use crate::ratelimit::model::TimeUnit;

const REQUEST_TIME: &str = "rate_limiting_request_time_sec";
const SERVICE_ERRORS: &str = "rate_limiting_service_errors";
const LIMITED_REQUESTS: &str = "rate_limiting_limited_requests";
const SHADOW_REQUESTS: &str = "rate_limiting_shadow_requests";
const CONFIG_LOAD_SUCCESS: &str = "config_load_success";
const CONFIG_LOAD_ERROR: &str = "config_load_error";

fn unit_label(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Second => "second",
        TimeUnit::Minute => "minute",
        TimeUnit::Hour => "hour",
        TimeUnit::Day => "day",
    }
}

/// Observe the wall-clock latency of one `should_rate_limit` call,
/// regardless of its outcome.
pub fn record_request_latency(elapsed: Duration) {
    metrics::histogram!(REQUEST_TIME).record(elapsed.as_secs_f64());
}

/// Bump `rate_limiting_service_errors{type}` — `type` is one of
/// `"redis"`, `"service"`, `"config_reload"` — plus the matching
/// unlabeled `call.should_rate_limit.*` internal counter for the two
/// backend-facing kinds.
pub fn record_service_error(error_type: &'static str) {
    metrics::counter!(SERVICE_ERRORS, "type" => error_type).increment(1);
    match error_type {
        "redis" => metrics::counter!("call.should_rate_limit.redis_error").increment(1),
        "service" => metrics::counter!("call.should_rate_limit.service_error").increment(1),
        _ => {}
    }
}

/// Bump the labeled over-limit counter for one descriptor.
pub fn record_limited(descriptor_key: &str, descriptor_value: &str, limit: u64, unit: TimeUnit) {
    metrics::counter!(
        LIMITED_REQUESTS,
        "descriptor_key" => descriptor_key.to_string(),
        "descriptor_value" => descriptor_value.to_string(),
        "limit" => limit.to_string(),
        "unit" => unit_label(unit),
    )
    .increment(1);
}

/// Bump the shadow-mode block counter for one descriptor; recorded with
/// the same label projection as `record_limited` instead of calling it,
/// whenever the service-wide or per-limit shadow flag suppresses an
/// over-limit descriptor.
pub fn record_shadow_block(descriptor_key: &str, descriptor_value: &str, limit: u64, unit: TimeUnit) {
    metrics::counter!(
        SHADOW_REQUESTS,
        "descriptor_key" => descriptor_key.to_string(),
        "descriptor_value" => descriptor_value.to_string(),
        "limit" => limit.to_string(),
        "unit" => unit_label(unit),
    )
    .increment(1);
    metrics::counter!("call.should_rate_limit.shadow_block").increment(1);
}

pub fn record_config_load_success(domain_count: usize) {
    metrics::counter!(CONFIG_LOAD_SUCCESS).increment(1);
    metrics::gauge!("rate_limiting_config_domains").set(domain_count as f64);
}

pub fn record_config_load_error() {
    metrics::counter!(CONFIG_LOAD_ERROR).increment(1);
    record_service_error("config_reload");
}
