use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use super::{Snapshot, SnapshotProvider};

/// Watches a directory of runtime config files with `notify` and treats
/// every file in it as one (name, body) blob — the on-disk analogue of
/// Envoy's `/etc/ratelimit/config` convention.
pub struct FileSnapshotProvider {
    root: PathBuf,
    _watcher: RecommendedWatcher,
    subscribers: Arc<Mutex<Vec<UnboundedSender<()>>>>,
}

impl FileSnapshotProvider {
    pub fn new(root: impl Into<PathBuf>) -> notify::Result<Self> {
        let root = root.into();
        let subscribers: Arc<Mutex<Vec<UnboundedSender<()>>>> = Arc::new(Mutex::new(Vec::new()));
        let for_watcher = subscribers.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(_event) => {
                for tx in for_watcher.lock().iter() {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!(error = %e, "runtime snapshot watch error"),
        })?;
        watcher.watch(&root, RecursiveMode::NonRecursive)?;

        Ok(Self {
            root,
            _watcher: watcher,
            subscribers,
        })
    }
}

#[async_trait]
impl SnapshotProvider for FileSnapshotProvider {
    async fn snapshot(&self) -> Snapshot {
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || read_dir_entries(&root))
            .await
            .unwrap_or_default();
        Snapshot::new(entries)
    }

    fn subscribe(&self) -> UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

fn read_dir_entries(root: &Path) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    let Ok(read_dir) = std::fs::read_dir(root) else {
        return entries;
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(body) => {
                entries.insert(name.to_string(), body);
            }
            Err(e) => warn!(file = %path.display(), error = %e, "failed to read runtime config file"),
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn snapshot_reads_every_file_in_the_directory() {
        let dir = tempdir();
        fs::write(dir.join("a.yaml"), "domain: a\n").unwrap();
        fs::write(dir.join("b.yaml"), "domain: b\n").unwrap();

        let provider = FileSnapshotProvider::new(&dir).unwrap();
        let snapshot = provider.snapshot().await;

        assert_eq!(snapshot.get("a.yaml").unwrap(), "domain: a\n");
        assert_eq!(snapshot.get("b.yaml").unwrap(), "domain: b\n");

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn snapshot_of_missing_directory_is_empty() {
        let missing = std::env::temp_dir().join("hivemind-watcher-test-missing");
        fs::remove_dir_all(&missing).ok();
        let provider = FileSnapshotProvider::new(&missing);
        if let Ok(provider) = provider {
            let snapshot = provider.snapshot().await;
            assert_eq!(snapshot.keys().count(), 0);
        }
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "hivemind-watcher-test-{:?}",
            std::thread::current().id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
