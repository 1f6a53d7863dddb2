//! In-memory file store.
//!
//! Ingested tables live here under an opaque `FileId` until an explicit
//! cleanup or TTL expiry. The map is guarded by one RwLock; entries are
//! immutable after store (only the last-access stamp moves), so readers
//! share them through `Arc` without blocking each other.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use talentmap_protocol::{FileId, ParseMetadata, PipelineError, PipelineResult, Table};

/// One stored upload. Table and metadata never change after store.
#[derive(Debug)]
pub struct StoredFile {
    table: Table,
    metadata: ParseMetadata,
    last_access: RwLock<DateTime<Utc>>,
}

impl StoredFile {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn metadata(&self) -> &ParseMetadata {
        &self.metadata
    }

    fn touch(&self) {
        if let Ok(mut stamp) = self.last_access.write() {
            *stamp = Utc::now();
        }
    }

    fn expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match self.last_access.read() {
            Ok(stamp) => now - *stamp > ttl,
            Err(_) => false,
        }
    }
}

/// Process-wide `FileId -> StoredFile` map with last-access TTL.
pub struct FileStore {
    entries: RwLock<HashMap<FileId, Arc<StoredFile>>>,
    ttl: Duration,
}

impl FileStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64),
        }
    }

    /// Store a table and hand back its identifier.
    pub fn store(&self, table: Table, metadata: ParseMetadata) -> FileId {
        let id = FileId::generate();
        let entry = Arc::new(StoredFile {
            table,
            metadata,
            last_access: RwLock::new(Utc::now()),
        });
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(id.clone(), entry);
        }
        tracing::debug!(file_id = %id, "stored ingested table");
        id
    }

    /// Fetch a stored file, refreshing its TTL.
    pub fn retrieve(&self, id: &FileId) -> PipelineResult<Arc<StoredFile>> {
        let entry = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(id).cloned());
        match entry {
            Some(entry) => {
                let now = Utc::now();
                if entry.expired(self.ttl, now) {
                    self.remove(id);
                    return Err(PipelineError::FileNotFound {
                        file_id: id.to_string(),
                    });
                }
                entry.touch();
                Ok(entry)
            }
            None => Err(PipelineError::FileNotFound {
                file_id: id.to_string(),
            }),
        }
    }

    /// Drop a stored file. Returns whether it existed.
    pub fn remove(&self, id: &FileId) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Evict every entry whose TTL has lapsed; returns the eviction count.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(self.ttl, now));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::info!(evicted, "evicted expired tables from the store");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn backdate(&self, id: &FileId, seconds: i64) {
        if let Ok(entries) = self.entries.read() {
            if let Some(entry) = entries.get(id) {
                if let Ok(mut stamp) = entry.last_access.write() {
                    *stamp = Utc::now() - Duration::seconds(seconds);
                }
            }
        }
    }
}
