use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use tracing::warn;

use crate::users::record::UserRecord;

/// Durable storage of the full user record collection as one document.
///
/// `load` fails open: a missing, unreadable, or structurally invalid document
/// reads as an empty collection. `save` replaces the whole document; there is
/// no locking, so concurrent saves race and the last writer wins.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self) -> Vec<UserRecord>;
    async fn save(&self, records: &[UserRecord]) -> anyhow::Result<()>;
}

/// Production store: one pretty-printed JSON array on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self) -> Vec<UserRecord> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "user store unreadable, treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "user store is not valid JSON, treating as empty");
                Vec::new()
            }
        }
    }

    async fn save(&self, records: &[UserRecord]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("create user store directory")?;
            }
        }
        let body = serde_json::to_string_pretty(records).context("serialize user records")?;
        tokio::fs::write(&self.path, body)
            .await
            .context("write user store")?;
        Ok(())
    }
}

/// In-memory store for tests. Counts saves so tests can assert whether an
/// operation wrote back.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<UserRecord>>,
    saves: AtomicUsize,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_records(records: Vec<UserRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<UserRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self) -> Vec<UserRecord> {
        self.records.lock().unwrap().clone()
    }

    async fn save(&self, records: &[UserRecord]) -> anyhow::Result<()> {
        *self.records.lock().unwrap() = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
