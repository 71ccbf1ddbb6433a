//! Counter store adapter: the abstraction over the external key/value store
//! that makes counters agree across replicas.
//!
//! [`CounterStore`] exposes the one primitive the evaluator needs —
//! `INCRBY` with a set-TTL-on-create side effect — plus a pipelined
//! variant so one request's descriptors round-trip to the store together.
//! [`RedisCounterStore`] is the production implementation;
//! [`InMemoryCounterStore`] is a drop-in for tests and single-process runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::BackendError;
use crate::ratelimit::model::TimeUnit;

/// One increment to submit to a store: key, amount, and the TTL to apply
/// if (and only if) the key doesn't already exist.
pub type Increment = (String, u64, Duration);

/// Capability set required of a counter store backend.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add `n` to `key`, returning the post-increment value. If
    /// `key` was just created by this call, set its TTL to `ttl`.
    async fn increment_by(&self, key: &str, n: u64, ttl: Duration) -> Result<u64, BackendError>;

    /// Pipelined increments, response order preserved. Default
    /// implementation issues them sequentially; real backends should
    /// override this with a single round-trip.
    async fn increment_many(&self, increments: &[Increment]) -> Result<Vec<u64>, BackendError> {
        let mut out = Vec::with_capacity(increments.len());
        for (key, n, ttl) in increments {
            out.push(self.increment_by(key, *n, *ttl).await?);
        }
        Ok(out)
    }

    /// Liveness probe, used by the service facade's health roll-up.
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Redis-backed counter store using a pipelined `INCRBY` + conditional
/// `EXPIRE`: the TTL is only set when the returned value equals the
/// increment, i.e. the key was just created in this call. The TTL set is
/// always exactly the window's unit length, matching the counter-store
/// protocol's `EXPIRE` contract.
pub struct RedisCounterStore {
    manager: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect to a single Redis/Valkey endpoint.
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let client = redis::Client::open(url).map_err(BackendError::Redis)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(BackendError::Redis)?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_by(&self, key: &str, n: u64, ttl: Duration) -> Result<u64, BackendError> {
        let mut conn = self.manager.clone();
        let value: i64 = conn.incr(key, n as i64).await.map_err(BackendError::Redis)?;
        if value == n as i64 {
            let _: () = conn
                .expire(key, ttl.as_secs() as i64)
                .await
                .map_err(BackendError::Redis)?;
        }
        Ok(value as u64)
    }

    async fn increment_many(&self, increments: &[Increment]) -> Result<Vec<u64>, BackendError> {
        if increments.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.clone();

        let mut pipe = redis::pipe();
        for (key, n, _) in increments {
            pipe.cmd("INCRBY").arg(key).arg(*n);
        }
        let values: Vec<i64> = pipe.query_async(&mut conn).await.map_err(BackendError::Redis)?;

        let mut expire_pipe = redis::pipe();
        let mut needs_expire = false;
        for ((key, n, ttl), value) in increments.iter().zip(values.iter()) {
            if *value == *n as i64 {
                needs_expire = true;
                expire_pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs() as i64);
            }
        }
        if needs_expire {
            expire_pipe
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(BackendError::Redis)?;
        }

        Ok(values.into_iter().map(|v| v.max(0) as u64).collect())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(BackendError::Redis)?;
        Ok(())
    }
}

/// In-process counter store, useful for tests and for running the service
/// without an external Redis. TTL is honored lazily: an expired entry is
/// reset the next time it's touched, the same "reset on access" shape as
/// a real store's expiry.
#[derive(Default)]
pub struct InMemoryCounterStore {
    entries: Mutex<HashMap<String, (u64, std::time::Instant, Duration)>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_by(&self, key: &str, n: u64, ttl: Duration) -> Result<u64, BackendError> {
        let mut entries = self.entries.lock();
        let now = std::time::Instant::now();

        let value = match entries.get_mut(key) {
            Some((count, created, entry_ttl)) if now.duration_since(*created) < *entry_ttl => {
                *count += n;
                *count
            }
            _ => {
                entries.insert(key.to_string(), (n, now, ttl));
                n
            }
        };

        Ok(value)
    }
}

/// Routes each increment to the store configured for its unit: a
/// dedicated per-second store isolates high-frequency keys from the
/// default store used for minute/hour/day limits.
pub struct CounterStoreRouter {
    default_store: Arc<dyn CounterStore>,
    per_second_store: Option<Arc<dyn CounterStore>>,
}

impl CounterStoreRouter {
    pub fn new(default_store: Arc<dyn CounterStore>) -> Self {
        Self {
            default_store,
            per_second_store: None,
        }
    }

    pub fn with_per_second(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.per_second_store = Some(store);
        self
    }

    pub fn store_for(&self, unit: TimeUnit) -> &Arc<dyn CounterStore> {
        match (unit, &self.per_second_store) {
            (TimeUnit::Second, Some(store)) => store,
            _ => &self.default_store,
        }
    }

    pub async fn ping(&self) -> Result<(), BackendError> {
        self.default_store.ping().await?;
        if let Some(store) = &self.per_second_store {
            store.ping().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_increments_monotonically() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.increment_by("k", 1, Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.increment_by("k", 2, Duration::from_secs(60)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn in_memory_store_resets_after_ttl() {
        let store = InMemoryCounterStore::new();
        store.increment_by("k", 5, Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let value = store.increment_by("k", 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn router_prefers_per_second_store_for_second_unit() {
        let default_store = Arc::new(InMemoryCounterStore::new());
        let per_second_store = Arc::new(InMemoryCounterStore::new());
        let router = CounterStoreRouter::new(default_store.clone()).with_per_second(per_second_store.clone());

        router.store_for(TimeUnit::Second).increment_by("k", 1, Duration::from_secs(1)).await.unwrap();
        assert_eq!(per_second_store.increment_by("k", 0, Duration::from_secs(1)).await.unwrap(), 1);

        router.store_for(TimeUnit::Minute).increment_by("k2", 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(default_store.increment_by("k2", 0, Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn router_falls_back_to_default_without_per_second_store() {
        let default_store = Arc::new(InMemoryCounterStore::new());
        let router = CounterStoreRouter::new(default_store.clone());
        assert!(Arc::ptr_eq(router.store_for(TimeUnit::Second), &default_store));
    }
}
