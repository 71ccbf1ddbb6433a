//! Background reload loop: wires a [`SnapshotProvider`] to the
//! [`loader`](crate::ratelimit::loader) and publishes the result through
//! [`RateLimitService::config_handle`].
//!
//! Runs an initial synchronous load before the server starts accepting
//! traffic, then reacts to subscriber edges for the lifetime of the
//! process. A failed reload never clears the previously published
//! configuration (spec §4.6).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::ratelimit::loader;
use crate::service::{note_configuration_load_failure, publish_configuration, RateLimitService};
use crate::watcher::SnapshotProvider;

/// Perform one load from `provider` and publish it on `service`, without
/// touching the subscription. Used both for the initial synchronous load
/// and for every subsequent edge.
pub async fn reload_once(
    provider: &dyn SnapshotProvider,
    service: &RateLimitService,
    runtime_prefix: Option<&str>,
) -> bool {
    let snapshot = provider.snapshot().await;
    let blobs = snapshot.into_pairs(runtime_prefix);

    if blobs.is_empty() {
        note_configuration_load_failure("runtime", "no configuration blobs found");
        return false;
    }

    match loader::load(&blobs) {
        Ok(config) => {
            publish_configuration(&service.config_handle(), config);
            true
        }
        Err(e) => {
            note_configuration_load_failure(&e.source, &e.message);
            false
        }
    }
}

/// Spawn the background task that re-runs [`reload_once`] every time the
/// provider signals a change, until `shutdown` is cancelled.
pub fn spawn(
    provider: Arc<dyn SnapshotProvider>,
    service: RateLimitService,
    runtime_prefix: Option<String>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut edges = provider.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("stopping configuration reloader");
                    break;
                }
                edge = edges.recv() => {
                    match edge {
                        Some(()) => {
                            reload_once(provider.as_ref(), &service, runtime_prefix.as_deref()).await;
                        }
                        None => {
                            error!("runtime snapshot watcher channel closed, backing off");
                            tokio::time::sleep(crate::service::WATCHER_RETRY_BACKOFF).await;
                            edges = provider.subscribe();
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::FixedClock;
    use crate::ratelimit::store::{CounterStoreRouter, InMemoryCounterStore};
    use crate::watcher::InMemorySnapshotProvider;

    fn service() -> RateLimitService {
        let store = CounterStoreRouter::new(Arc::new(InMemoryCounterStore::new()));
        RateLimitService::new(store, Arc::new(FixedClock(1_000)), false)
    }

    #[tokio::test]
    async fn initial_load_publishes_configuration() {
        let provider = InMemorySnapshotProvider::new();
        provider.put(
            "a.yaml",
            "domain: d\ndescriptors:\n  - key: k\n    rate_limit:\n      requests_per_unit: 1\n      unit: second\n",
        );
        let service = service();

        let ok = reload_once(&provider, &service, None).await;
        assert!(ok);
        assert!(service.has_configuration());
    }

    #[tokio::test]
    async fn empty_snapshot_does_not_publish() {
        let provider = InMemorySnapshotProvider::new();
        let service = service();

        let ok = reload_once(&provider, &service, None).await;
        assert!(!ok);
        assert!(!service.has_configuration());
    }

    #[tokio::test]
    async fn invalid_blob_leaves_prior_configuration_untouched() {
        let provider = InMemorySnapshotProvider::new();
        provider.put(
            "a.yaml",
            "domain: d\ndescriptors:\n  - key: k\n    rate_limit:\n      requests_per_unit: 1\n      unit: second\n",
        );
        let service = service();
        assert!(reload_once(&provider, &service, None).await);

        provider.put("a.yaml", "domain: d\ndescriptors:\n  - key: k\n");
        let ok = reload_once(&provider, &service, None).await;

        assert!(!ok);
        assert!(service.has_configuration(), "prior configuration must survive a failed reload");
    }

    #[tokio::test]
    async fn spawned_reloader_reacts_to_a_put_after_startup() {
        let memory_provider = Arc::new(InMemorySnapshotProvider::new());
        let provider: Arc<dyn SnapshotProvider> = memory_provider.clone();
        let service = service();
        let shutdown = CancellationToken::new();

        let handle = spawn(provider, service.clone(), None, shutdown.clone());

        memory_provider.put(
            "a.yaml",
            "domain: d\ndescriptors:\n  - key: k\n    rate_limit:\n      requests_per_unit: 1\n      unit: second\n",
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(service.has_configuration());

        shutdown.cancel();
        let _ = handle.await;
    }
}
