//! Persisted queue snapshots
//!
//! The pending queue is written wholesale as
//! `{ "<snapshot key>": [records...], "lastUpdated": <epoch millis> }`.
//! An empty file means "nothing pending".

use crate::error::{Error, Result};
use crate::sync::SyncRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Storage primitive holding the raw snapshot text
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Current contents, `None` when absent or empty
    async fn read(&self) -> Result<Option<String>>;

    /// Replace the contents
    async fn write(&self, contents: String) -> Result<()>;

    /// Truncate to empty content
    async fn clear(&self) -> Result<()>;
}

/// Decoded snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub records: Vec<T>,
    pub last_updated: Option<i64>,
}

pub fn encode_snapshot<T: SyncRecord>(records: &[T], last_updated: i64) -> Result<String> {
    let mut root = Map::new();
    root.insert(T::SNAPSHOT_KEY.to_string(), serde_json::to_value(records)?);
    root.insert("lastUpdated".to_string(), Value::from(last_updated));
    Ok(serde_json::to_string(&Value::Object(root))?)
}

pub fn decode_snapshot<T: SyncRecord>(contents: &str) -> Result<Snapshot<T>> {
    let mut root: Value = serde_json::from_str(contents)?;
    let records = root
        .get_mut(T::SNAPSHOT_KEY)
        .map(Value::take)
        .ok_or_else(|| Error::Parse(format!("snapshot has no \"{}\" list", T::SNAPSHOT_KEY)))?;

    Ok(Snapshot {
        records: serde_json::from_value(records)?,
        last_updated: root.get("lastUpdated").and_then(Value::as_i64),
    })
}

/// Snapshot stored in a JSON file on local disk
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_blocking(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a temp file in the same directory, then rename over the target
    fn write_blocking(path: &Path, contents: &str) -> Result<()> {
        let parent = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    async fn blocking<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Path) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || f(&path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn read(&self) -> Result<Option<String>> {
        self.blocking(Self::read_blocking).await
    }

    async fn write(&self, contents: String) -> Result<()> {
        self.blocking(move |path| Self::write_blocking(path, &contents))
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.blocking(|path| Self::write_blocking(path, "")).await
    }
}
