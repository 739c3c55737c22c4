//! Batch uploader - deduplicated, persisted, prioritized uploads
//!
//! Records are queued in memory, mirrored to a snapshot store so they survive
//! restarts, and uploaded in rounds of at most `batch_size` records, most
//! recent first. Only one round is in flight at a time. A round starts when
//! the queue reaches `batch_size`, when the batch timer fires, or on `flush`.
//! A failed round puts its batch back and retries on the timer.

use crate::config::{
    RetryPolicy, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_UPLOAD_TIMEOUT,
};
use crate::error::{Error, Result};
use crate::sync::store::{decode_snapshot, encode_snapshot, SnapshotStore};
use crate::sync::transport::UploadTransport;
use crate::sync::{now_millis, sort_by_priority, QueuedItem, SyncRecord};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Uploader tuning
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Sent out of band with every batch
    pub device_id: String,
    pub batch_size: usize,
    /// Idle delay before a partial batch is uploaded
    pub batch_delay: Duration,
    pub upload_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

enum PersistOp {
    Save(String),
    Clear,
    Barrier(oneshot::Sender<()>),
}

struct PendingTimer {
    id: u64,
    handle: JoinHandle<()>,
}

struct State<T> {
    queue: Vec<QueuedItem<T>>,
    in_flight: Vec<QueuedItem<T>>,
    /// natural key -> upload time (0 = restored from storage)
    dedup: HashMap<String, i64>,
    in_progress: bool,
    initialized: bool,
    failures: u32,
    timer: Option<PendingTimer>,
    next_timer_id: u64,
}

impl<T> State<T> {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
            debug!(timer = timer.id, "Batch timer cancelled");
        }
    }
}

struct Inner<T> {
    config: UploaderConfig,
    store: Arc<dyn SnapshotStore>,
    transport: Arc<dyn UploadTransport>,
    state: Mutex<State<T>>,
    persist_tx: mpsc::UnboundedSender<PersistOp>,
    busy: watch::Sender<bool>,
    runtime: Handle,
}

/// Shared handle to one upload pipeline. Clones refer to the same queue.
pub struct BatchUploader<T: SyncRecord> {
    inner: Arc<Inner<T>>,
}

impl<T: SyncRecord> Clone for BatchUploader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SyncRecord> BatchUploader<T> {
    /// Create an uploader. Must be called from within a Tokio runtime; the
    /// other operations may then be called from any thread.
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        transport: Arc<dyn UploadTransport>,
        config: UploaderConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("uploader needs a Tokio runtime: {}", e)))?;

        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        runtime.spawn(persist_worker(Arc::clone(&store), persist_rx));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                transport,
                state: Mutex::new(State {
                    queue: Vec::new(),
                    in_flight: Vec::new(),
                    dedup: HashMap::new(),
                    in_progress: false,
                    initialized: false,
                    failures: 0,
                    timer: None,
                    next_timer_id: 0,
                }),
                persist_tx,
                busy: watch::Sender::new(false),
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.inner.config
    }

    /// Restore records left over from a previous run. Only the first call
    /// does anything; storage problems start an empty queue.
    pub async fn initialize_from_storage(&self) {
        {
            let mut state = self.lock();
            if state.initialized {
                debug!("Uploader already initialized");
                return;
            }
            state.initialized = true;
        }

        let mut items: Vec<QueuedItem<T>> = match self.inner.store.read().await {
            Ok(Some(contents)) => match decode_snapshot::<T>(&contents) {
                Ok(snapshot) => {
                    let queued_at = snapshot.last_updated.unwrap_or_else(now_millis);
                    snapshot
                        .records
                        .into_iter()
                        .map(|record| QueuedItem::with_time(record, queued_at))
                        .collect()
                }
                Err(e) => {
                    error!(
                        error = %e,
                        kind = T::SNAPSHOT_KEY,
                        "Persisted queue is malformed, starting fresh"
                    );
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(
                    error = %e,
                    kind = T::SNAPSHOT_KEY,
                    "Failed to read persisted queue, starting fresh"
                );
                Vec::new()
            }
        };

        sort_by_priority(&mut items);

        let mut guard = self.lock();
        let state = &mut *guard;
        let mut pending = pending_keys(state);
        let mut restored = 0;

        for item in items {
            let key = item.key();
            if key.is_empty() || !pending.insert(key.clone()) {
                continue;
            }
            state.dedup.entry(key).or_insert(0);
            state.queue.push(item);
            restored += 1;
        }

        if restored > 0 {
            info!(restored, kind = T::SNAPSHOT_KEY, "Restored pending upload queue");
        }

        if !state.queue.is_empty() && !state.in_progress && state.timer.is_none() {
            self.schedule_timer(state, self.inner.config.batch_delay);
        }
    }

    /// Queue records for upload. Returns how many were accepted.
    ///
    /// Records without a natural key, already uploaded this session, or
    /// already pending are skipped.
    pub fn queue_items(&self, items: Vec<T>) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut pending = pending_keys(state);
        let now = now_millis();

        let accepted: Vec<QueuedItem<T>> = items
            .into_iter()
            .filter(|record| match record.natural_key() {
                Some(key) if !key.is_empty() => {
                    !state.dedup.contains_key(&key) && pending.insert(key)
                }
                _ => false,
            })
            .map(|record| QueuedItem::with_time(record, now))
            .collect();

        if accepted.is_empty() {
            debug!(kind = T::SNAPSHOT_KEY, "Nothing new to queue");
            return 0;
        }

        let count = accepted.len();
        state.queue.extend(accepted);
        self.persist(state);

        debug!(count, queued = state.queue.len(), kind = T::SNAPSHOT_KEY, "Queued records");

        if state.in_progress {
            // Picked up, re-prioritized, by the next round
            return count;
        }

        self.schedule_timer(state, self.inner.config.batch_delay);
        if state.queue.len() >= self.batch_size() {
            self.start_round(state);
        }

        count
    }

    /// Upload now, regardless of queue size or timer
    pub fn flush(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.queue.is_empty() || state.in_progress {
            return;
        }
        self.start_round(state);
    }

    /// Records waiting for a round (excludes the batch in flight)
    pub fn queue_size(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_uploading(&self) -> bool {
        self.lock().in_progress
    }

    /// Upload time recorded for a natural key, 0 if restored from storage
    pub fn upload_time(&self, key: &str) -> Option<i64> {
        self.lock().dedup.get(key).copied()
    }

    /// Drop everything queued and cancel the timer. The dedup cache and the
    /// persisted snapshot are left alone.
    pub fn clear_queue(&self) {
        let mut state = self.lock();
        state.queue.clear();
        state.cancel_timer();
    }

    /// Wait for queued snapshot writes to reach the store
    pub async fn sync_storage(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.persist_tx.send(PersistOp::Barrier(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Wait until no round is in flight and the store is up to date
    pub async fn wait_idle(&self) {
        let mut busy = self.inner.busy.subscribe();
        let _ = busy.wait_for(|busy| !*busy).await;
        self.sync_storage().await;
    }

    /// Cancel the timer and let any in-flight round finish
    pub async fn shutdown(&self) {
        self.lock().cancel_timer();
        self.wait_idle().await;
        info!(pending = self.queue_size(), kind = T::SNAPSHOT_KEY, "Uploader stopped");
    }

    fn batch_size(&self) -> usize {
        self.inner.config.batch_size.max(1)
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the unacknowledged records, in priority order, to the store
    fn persist(&self, state: &State<T>) {
        if state.queue.is_empty() && state.in_flight.is_empty() {
            let _ = self.inner.persist_tx.send(PersistOp::Clear);
            return;
        }

        let mut items: Vec<QueuedItem<T>> = state
            .queue
            .iter()
            .chain(state.in_flight.iter())
            .cloned()
            .collect();
        sort_by_priority(&mut items);
        let records: Vec<T> = items.into_iter().map(|item| item.record).collect();

        match encode_snapshot(&records, now_millis()) {
            Ok(contents) => {
                let _ = self.inner.persist_tx.send(PersistOp::Save(contents));
            }
            Err(e) => warn!(error = %e, "Failed to encode queue snapshot"),
        }
    }

    /// Schedule a round after `delay`, unless a timer is already pending
    fn schedule_timer(&self, state: &mut State<T>, delay: Duration) {
        if state.timer.is_some() {
            return;
        }

        state.next_timer_id += 1;
        let id = state.next_timer_id;
        let this = self.clone();
        let handle = self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            this.on_timer(id);
        });

        state.timer = Some(PendingTimer { id, handle });
        debug!(timer = id, delay_secs = delay.as_secs(), "Batch timer scheduled");
    }

    fn on_timer(&self, id: u64) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.timer.as_ref().map(|timer| timer.id) != Some(id) {
            return;
        }
        state.timer = None;
        debug!(timer = id, "Batch timer fired");
        self.start_round(state);
    }

    /// Claim the in-progress flag, pick the batch, and spawn its upload
    fn start_round(&self, state: &mut State<T>) {
        if state.in_progress {
            debug!("Upload round already in flight");
            return;
        }
        state.cancel_timer();

        if state.queue.is_empty() {
            return;
        }

        let mut items = std::mem::take(&mut state.queue);
        sort_by_priority(&mut items);
        let remainder = items.split_off(self.batch_size().min(items.len()));
        state.queue = remainder;

        let payload: Vec<Value> = items.iter().map(|item| item.record.to_wire()).collect();
        state.in_flight = items;
        state.in_progress = true;
        self.inner.busy.send_replace(true);

        info!(
            batch = payload.len(),
            remaining = state.queue.len(),
            kind = T::SNAPSHOT_KEY,
            "Starting upload round"
        );

        let this = self.clone();
        self.inner.runtime.spawn(async move {
            let result = this.upload(payload).await;
            this.finish_round(result);
        });
    }

    async fn upload(&self, payload: Vec<Value>) -> Result<()> {
        let config = &self.inner.config;
        let call = self
            .inner
            .transport
            .upload(T::ENDPOINT, &config.device_id, payload);

        match tokio::time::timeout(config.upload_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(config.upload_timeout)),
        }
    }

    fn finish_round(&self, result: Result<()>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let batch = std::mem::take(&mut state.in_flight);

        let next_delay = match result {
            Ok(()) => {
                let now = now_millis();
                for item in &batch {
                    state.dedup.insert(item.key(), now);
                }
                state.failures = 0;
                info!(
                    uploaded = batch.len(),
                    remaining = state.queue.len(),
                    kind = T::SNAPSHOT_KEY,
                    "Upload round succeeded"
                );
                self.inner.config.batch_delay
            }
            Err(e) => {
                state.failures += 1;
                let delay = self.inner.config.retry.delay_for(state.failures);
                warn!(
                    error = %e,
                    batch = batch.len(),
                    failures = state.failures,
                    retry_in_secs = delay.as_secs(),
                    kind = T::SNAPSHOT_KEY,
                    "Upload round failed, re-queueing batch"
                );
                state.queue.extend(batch);
                delay
            }
        };

        self.persist(state);
        state.in_progress = false;
        self.inner.busy.send_replace(false);

        if !state.queue.is_empty() {
            self.schedule_timer(state, next_delay);
        }
    }
}

/// Keys currently queued or in flight
fn pending_keys<T: SyncRecord>(state: &State<T>) -> HashSet<String> {
    state
        .queue
        .iter()
        .chain(state.in_flight.iter())
        .map(QueuedItem::key)
        .collect()
}

async fn persist_worker(store: Arc<dyn SnapshotStore>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            PersistOp::Save(contents) => {
                if let Err(e) = store.write(contents).await {
                    warn!(error = %e, "Failed to persist queue snapshot");
                }
            }
            PersistOp::Clear => {
                if let Err(e) = store.clear().await {
                    warn!(error = %e, "Failed to clear queue snapshot");
                }
            }
            PersistOp::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}
