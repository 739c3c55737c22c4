//! Device-side batch upload pipeline
//!
//! Records produced by device sync jobs are queued, persisted to a local
//! snapshot, and uploaded to the backend in priority-ordered batches.

pub mod store;
pub mod testing;
pub mod transport;
pub mod uploader;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;

pub use store::{FileSnapshotStore, SnapshotStore};
pub use transport::{HttpTransport, UploadTransport};
pub use uploader::{BatchUploader, UploaderConfig};

/// A record that can travel through the batch upload pipeline
pub trait SyncRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Key under which queued records are stored in the snapshot file
    const SNAPSHOT_KEY: &'static str;

    /// Backend path the records are posted to
    const ENDPOINT: &'static str;

    /// Unique identifier used for dedup. `None` means the record is not syncable.
    fn natural_key(&self) -> Option<String>;

    /// Epoch millis of the record's last activity, if known
    fn recency(&self) -> Option<i64>;

    /// Flattened field map in the backend's wire shape
    fn to_wire(&self) -> serde_json::Value;
}

/// A record waiting for upload
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedItem<T> {
    pub record: T,
    pub queued_at: i64,
}

impl<T: SyncRecord> QueuedItem<T> {
    pub fn with_time(record: T, queued_at: i64) -> Self {
        Self { record, queued_at }
    }

    /// Recency used for ordering, falling back to enqueue time
    pub fn priority_time(&self) -> i64 {
        self.record.recency().unwrap_or(self.queued_at)
    }

    pub fn key(&self) -> String {
        self.record.natural_key().unwrap_or_default()
    }
}

/// Most recent first, natural key descending on ties
pub fn compare_priority<T: SyncRecord>(a: &QueuedItem<T>, b: &QueuedItem<T>) -> Ordering {
    b.priority_time()
        .cmp(&a.priority_time())
        .then_with(|| b.key().cmp(&a.key()))
}

pub fn sort_by_priority<T: SyncRecord>(items: &mut [QueuedItem<T>]) {
    items.sort_by(compare_priority);
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
