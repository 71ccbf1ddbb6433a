use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{Snapshot, SnapshotProvider};

/// In-process snapshot provider for tests and for running without a
/// runtime config directory. `put`/`remove` mutate the in-memory set and
/// fan out an edge to every subscriber.
#[derive(Default)]
pub struct InMemorySnapshotProvider {
    entries: Mutex<HashMap<String, String>>,
    subscribers: Mutex<Vec<UnboundedSender<()>>>,
}

impl InMemorySnapshotProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: impl Into<String>, body: impl Into<String>) {
        self.entries.lock().insert(name.into(), body.into());
        self.notify();
    }

    pub fn remove(&self, name: &str) {
        self.entries.lock().remove(name);
        self.notify();
    }

    fn notify(&self) {
        let subscribers = self.subscribers.lock();
        for tx in subscribers.iter() {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl SnapshotProvider for InMemorySnapshotProvider {
    async fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.entries.lock().clone())
    }

    fn subscribe(&self) -> UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}
