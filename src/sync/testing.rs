//! In-memory doubles for the storage and transport seams
//!
//! Used by the uploader tests and by integration tests that need to observe
//! what was persisted or uploaded without touching disk or network.

use crate::error::{Error, Result};
use crate::sync::store::SnapshotStore;
use crate::sync::transport::UploadTransport;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// In-memory store, shared between uploader instances to simulate restarts
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    contents: Mutex<Option<String>>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: &str) -> Self {
        let store = Self::default();
        *store.lock() = Some(contents.to_string());
        store
    }

    /// Make every subsequent operation fail with an IO error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Raw contents, `None` when never written
    pub fn contents(&self) -> Option<String> {
        self.lock().clone()
    }

    /// Number of successful writes and clears
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("storage unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self) -> Result<Option<String>> {
        self.check()?;
        Ok(self.lock().clone().filter(|c| !c.trim().is_empty()))
    }

    async fn write(&self, contents: String) -> Result<()> {
        self.check()?;
        *self.lock() = Some(contents);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check()?;
        *self.lock() = Some(String::new());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Transport double that records every call.
///
/// Can be switched into failure mode, or held closed so a batch stays in flight.
pub struct RecordingTransport {
    calls: Mutex<Vec<RecordedUpload>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    gate: watch::Sender<bool>,
}

/// One recorded `upload` call
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub endpoint: String,
    pub device_id: String,
    pub batch: Vec<Value>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
            gate: watch::Sender::new(true),
        }
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make each upload take this long before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Block uploads until `release` is called
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<RecordedUpload> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl UploadTransport for RecordingTransport {
    async fn upload(&self, endpoint: &str, device_id: &str, batch: Vec<Value>) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedUpload {
                endpoint: endpoint.to_string(),
                device_id: device_id.to_string(),
                batch,
            });

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Upload {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}
