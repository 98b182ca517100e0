//! JSON snapshot persistence for the conversation store.
//!
//! All writes go through a single background [`SnapshotWorker`], so at most one
//! write is ever in flight. Requests made while a write is running coalesce
//! into one follow-up write. The worker also flushes on a fixed interval and
//! once more on shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::store::{ConversationStore, Snapshot};
use crate::error::PersistenceError;

/// Default interval between unconditional flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// A single JSON document mapping sender id to conversation record.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing file is an empty store.
    pub async fn load(&self) -> Result<Snapshot, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No snapshot found, starting empty");
                Ok(Snapshot::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the whole document (temp file + rename).
    pub async fn write(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Cheap, cloneable handle for requesting a snapshot write.
#[derive(Clone, Default)]
pub struct SnapshotTrigger {
    notify: Arc<Notify>,
}

impl SnapshotTrigger {
    /// Request a write without waiting for it.
    pub fn request(&self) {
        self.notify.notify_one();
    }
}

/// Background task that owns every snapshot write.
pub struct SnapshotWorker {
    trigger: SnapshotTrigger,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SnapshotWorker {
    /// Spawn the worker.
    pub fn spawn(store: Arc<ConversationStore>, file: SnapshotFile, interval: Duration) -> Self {
        let trigger = SnapshotTrigger::default();
        let notify = Arc::clone(&trigger.notify);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = notify.notified() => {
                        debug!("Snapshot requested");
                    }
                    _ = ticker.tick() => {
                        debug!("Periodic snapshot");
                    }
                    _ = shutdown_rx.changed() => {
                        flush(&store, &file).await;
                        info!("Snapshot worker stopped");
                        break;
                    }
                }
                flush(&store, &file).await;
            }
        });

        Self {
            trigger,
            shutdown_tx,
            handle,
        }
    }

    pub fn trigger(&self) -> SnapshotTrigger {
        self.trigger.clone()
    }

    /// Stop the worker after a final flush and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Snapshot worker panicked");
        }
    }
}

/// Write the current store contents. Failures are logged; the next flush retries.
async fn flush(store: &ConversationStore, file: &SnapshotFile) {
    let snapshot = store.snapshot().await;
    match file.write(&snapshot).await {
        Ok(()) => debug!(
            conversations = snapshot.len(),
            path = %file.path().display(),
            "Snapshot written"
        ),
        Err(e) => warn!(error = %e, path = %file.path().display(), "Snapshot write failed"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::conversation::model::{SenderId, Turn};

    fn id(raw: &str) -> SenderId {
        SenderId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path().join("nope.json"));
        assert!(file.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(SnapshotFile::new(path).load().await.is_err());
    }

    #[tokio::test]
    async fn write_then_load_preserves_records() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path().join("data").join("conversations.json"));
        let store = ConversationStore::new();
        let now = Utc::now();
        store.append(&id("12025551234"), Turn::user("Hello", now), now).await;
        store.append(&id("12025551234"), Turn::assistant("Hi!", now), now).await;
        store.set_contact_name(&id("12025551234"), "Ana").await;

        file.write(&store.snapshot().await).await.unwrap();
        let loaded = file.load().await.unwrap();

        let record = &loaded[&id("12025551234")];
        assert_eq!(record.contact_name.as_deref(), Some("Ana"));
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[1].content, "Hi!");
    }

    #[tokio::test]
    async fn worker_flushes_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conversations.json");
        let store = ConversationStore::new();
        let worker = SnapshotWorker::spawn(
            Arc::clone(&store),
            SnapshotFile::new(&path),
            Duration::from_secs(3600),
        );

        let now = Utc::now();
        store.append(&id("12025551234"), Turn::user("Hello", now), now).await;
        worker.shutdown().await;

        let loaded = SnapshotFile::new(&path).load().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn worker_flushes_on_interval() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conversations.json");
        let store = ConversationStore::new();
        let worker = SnapshotWorker::spawn(
            Arc::clone(&store),
            SnapshotFile::new(&path),
            Duration::from_millis(50),
        );

        let now = Utc::now();
        store.append(&id("12025551234"), Turn::user("Hello", now), now).await;

        let mut loaded = Snapshot::new();
        for _ in 0..100 {
            if let Ok(snapshot) = SnapshotFile::new(&path).load().await {
                if !snapshot.is_empty() {
                    loaded = snapshot;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(loaded.len(), 1, "periodic flush did not write the record");

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn worker_writes_on_request() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conversations.json");
        let store = ConversationStore::new();
        let worker = SnapshotWorker::spawn(
            Arc::clone(&store),
            SnapshotFile::new(&path),
            Duration::from_secs(3600),
        );

        let now = Utc::now();
        store.append(&id("12025551234"), Turn::user("Hello", now), now).await;
        worker.trigger().request();

        let mut written = false;
        for _ in 0..50 {
            if tokio::fs::metadata(&path).await.is_ok() {
                written = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(written, "snapshot was not written after request");

        worker.shutdown().await;
    }
}
