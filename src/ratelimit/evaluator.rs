//! The rate-limit cache: the evaluator that turns resolved limits into
//! per-descriptor verdicts against the counter store.
//!
//! Stateless over its own heap (spec §4.4): everything it needs comes in
//! as arguments, and a backend error aborts the whole evaluation before any
//! partial status is returned.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::BackendError;

use super::clock::Clock;
use super::descriptor::counter_key;
use super::model::{RateLimit, TimeUnit};
use super::store::{CounterStore, CounterStoreRouter, Increment};

/// Outcome of evaluating one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    OverLimit,
}

/// Per-descriptor result of a rate limit check.
#[derive(Debug, Clone)]
pub struct DescriptorStatus {
    pub verdict: Verdict,
    pub limit: Option<RateLimit>,
    pub limit_remaining: u32,
    pub duration_until_reset: Duration,
}

/// Evaluate every descriptor in one request against its resolved limit.
///
/// `descriptors` and `limits` are parallel arrays of the same length;
/// `limits[i] == None` means "no limit configured for this descriptor."
/// All descriptors share one `now` and submit their increments to the
/// store in as few pipelined round-trips as the configured routing allows
/// (spec §4.4 steps 1–3). A backend error aborts evaluation entirely: no
/// partial status vector is ever returned.
pub async fn evaluate(
    router: &CounterStoreRouter,
    clock: &dyn Clock,
    domain: &str,
    descriptors: &[Vec<(String, String)>],
    limits: &[Option<RateLimit>],
    hits_addend: u32,
) -> Result<Vec<DescriptorStatus>, BackendError> {
    assert_eq!(descriptors.len(), limits.len());

    let now = clock.now_unix();
    // Wire schema permits 0; the core treats it as 1 (spec §6, §9).
    let hits = if hits_addend == 0 { 1 } else { hits_addend } as u64;

    let mut statuses: Vec<Option<DescriptorStatus>> = vec![None; descriptors.len()];
    let mut seconds_batch: Vec<(usize, Increment)> = Vec::new();
    let mut others_batch: Vec<(usize, Increment)> = Vec::new();

    for (i, limit) in limits.iter().enumerate() {
        match limit {
            None => {
                statuses[i] = Some(DescriptorStatus {
                    verdict: Verdict::Ok,
                    limit: None,
                    limit_remaining: 0,
                    duration_until_reset: Duration::ZERO,
                });
            }
            Some(l) if l.unlimited => {
                statuses[i] = Some(DescriptorStatus {
                    verdict: Verdict::Ok,
                    limit: Some(l.clone()),
                    limit_remaining: l.requests_per_unit as u32,
                    duration_until_reset: Duration::ZERO,
                });
            }
            Some(l) => {
                let unit_seconds = l.unit.unit_in_seconds();
                let key = counter_key(domain, &descriptors[i], unit_seconds, now);
                let ttl = Duration::from_secs(unit_seconds);

                trace!(domain = %domain, key = %key, hits, "submitting increment");

                if l.unit == TimeUnit::Second {
                    seconds_batch.push((i, (key, hits, ttl)));
                } else {
                    others_batch.push((i, (key, hits, ttl)));
                }
            }
        }
    }

    let seconds_store = router.store_for(TimeUnit::Second).clone();
    let others_store = router.store_for(TimeUnit::Minute).clone();

    let seconds_incs: Vec<Increment> = seconds_batch.iter().map(|(_, inc)| inc.clone()).collect();
    let others_incs: Vec<Increment> = others_batch.iter().map(|(_, inc)| inc.clone()).collect();

    let (seconds_results, others_results) = tokio::try_join!(
        run_batch(seconds_store, seconds_incs),
        run_batch(others_store, others_incs),
    )?;

    for ((i, _), post_count) in seconds_batch.iter().zip(seconds_results.iter()) {
        statuses[*i] = Some(build_status(limits[*i].as_ref().unwrap(), *post_count, now));
    }
    for ((i, _), post_count) in others_batch.iter().zip(others_results.iter()) {
        statuses[*i] = Some(build_status(limits[*i].as_ref().unwrap(), *post_count, now));
    }

    Ok(statuses.into_iter().map(|s| s.expect("every descriptor is assigned a status")).collect())
}

async fn run_batch(store: Arc<dyn CounterStore>, batch: Vec<Increment>) -> Result<Vec<u64>, BackendError> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    store.increment_many(&batch).await
}

fn build_status(limit: &RateLimit, post_count: u64, now: u64) -> DescriptorStatus {
    let within = post_count <= limit.requests_per_unit;
    let verdict = if within { Verdict::Ok } else { Verdict::OverLimit };
    let remaining = if within {
        limit.requests_per_unit.saturating_sub(post_count) as u32
    } else {
        debug!(limit = limit.requests_per_unit, post_count, "rate limit exceeded");
        0
    };

    let unit_seconds = limit.unit.unit_in_seconds();
    let window_start = super::descriptor::window_divider(now, unit_seconds);
    let duration_until_reset = Duration::from_secs((window_start + unit_seconds).saturating_sub(now));

    DescriptorStatus {
        verdict,
        limit: Some(limit.clone()),
        limit_remaining: remaining,
        duration_until_reset,
    }
}
