//! Runtime snapshot watcher: the external collaborator that tells the
//! config reloader when to re-run the loader.
//!
//! A [`SnapshotProvider`] enumerates a point-in-time [`Snapshot`] of
//! key/value configuration blobs and signals an edge on a channel every
//! time the underlying source changes. It never interprets the blobs
//! itself — that's the loader's job.

mod file;
mod memory;

pub use file::FileSnapshotProvider;
pub use memory::InMemorySnapshotProvider;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

/// A point-in-time view of the runtime configuration source.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: HashMap<String, String>,
}

impl Snapshot {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.entries.get(key)
    }

    /// Consume the snapshot into (name, body) pairs, optionally restricted
    /// to keys bearing `prefix`.
    pub fn into_pairs(self, prefix: Option<&str>) -> Vec<(String, String)> {
        self.entries
            .into_iter()
            .filter(|(key, _)| prefix.map(|p| key.starts_with(p)).unwrap_or(true))
            .collect()
    }
}

/// Opaque provider of runtime configuration snapshots (spec's "Runtime
/// snapshot interface": `Snapshot() -> {Keys(), Get(key)}` plus
/// `AddUpdateCallback`). `subscribe` returns a channel that receives one
/// edge per change; the caller decides when to re-snapshot.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self) -> Snapshot;
    fn subscribe(&self) -> UnboundedReceiver<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_filter_keeps_only_matching_keys() {
        let mut entries = HashMap::new();
        entries.insert("config.a".to_string(), "a".to_string());
        entries.insert("other.b".to_string(), "b".to_string());
        let snapshot = Snapshot::new(entries);

        let filtered = snapshot.into_pairs(Some("config."));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].0, "config.a");
    }

    #[test]
    fn no_prefix_keeps_everything() {
        let mut entries = HashMap::new();
        entries.insert("a".to_string(), "1".to_string());
        entries.insert("b".to_string(), "2".to_string());
        let snapshot = Snapshot::new(entries);

        assert_eq!(snapshot.into_pairs(None).len(), 2);
    }
}
