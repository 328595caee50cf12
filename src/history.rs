//! Bounded, most-recent-first ledger of successful conversions.
//!
//! The ledger is one JSON array stored under a single key in a
//! [`KeyValueStore`]. Reads never fail: absent or unreadable storage is an
//! empty history. Writes can fail; the controller logs that and moves on.

use crate::error::ConvertError;
use crate::registry::Category;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Display format of [`HistoryRecord::time`].
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Storage ──────────────────────────────────────────────────────────────

/// A minimal string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ConvertError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ConvertError>;
}

/// One file per key, `<dir>/<key>.json`, written atomically.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ConvertError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConvertError::Storage(format!("read {key}: {e}"))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConvertError> {
        let storage = |e: std::io::Error| ConvertError::Storage(format!("write {key}: {e}"));
        std::fs::create_dir_all(&self.dir).map_err(storage)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(storage)?;
        tmp.write_all(value.as_bytes()).map_err(storage)?;
        tmp.persist(self.path_for(key)).map_err(|e| storage(e.error))?;
        Ok(())
    }
}

/// In-memory store for tests and sessions that should not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ConvertError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConvertError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ── Records ──────────────────────────────────────────────────────────────

/// What the controller knows about a finished conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub category: Category,
    /// Input names joined with `", "`.
    pub inputs: String,
    pub output: String,
    pub size_kb: f64,
    pub operation: String,
}

/// A stored ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Milliseconds since the epoch, strictly increasing within a ledger.
    pub id: i64,
    #[serde(rename = "type")]
    pub category: Category,
    pub inputs: String,
    pub output: String,
    /// Output size in kilobytes, one decimal.
    pub size_kb: f64,
    pub operation: String,
    /// Local time, [`TIME_FORMAT`].
    pub time: String,
}

/// The history ledger over a store.
#[derive(Clone)]
pub struct HistoryLedger {
    store: Arc<dyn KeyValueStore>,
    key: String,
    capacity: usize,
}

impl std::fmt::Debug for HistoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLedger")
            .field("key", &self.key)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, capacity: usize) -> Self {
        Self {
            store,
            key: key.into(),
            capacity: capacity.max(1),
        }
    }

    /// A ledger that lives only as long as the process.
    pub fn in_memory(key: impl Into<String>, capacity: usize) -> Self {
        Self::new(Arc::new(MemoryStore::new()), key, capacity)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Every stored record, newest first. Empty on absent or corrupt storage.
    pub fn load(&self) -> Vec<HistoryRecord> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("History unavailable: {}", e);
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Ignoring unreadable history '{}': {}", self.key, e);
            Vec::new()
        })
    }

    /// Prepend a record and drop whatever falls beyond capacity.
    pub fn record(&self, entry: NewHistoryEntry) -> Result<HistoryRecord, ConvertError> {
        let mut records = self.load();
        let newest = records.first().map(|r| r.id).unwrap_or(i64::MIN);
        let record = HistoryRecord {
            id: Utc::now().timestamp_millis().max(newest.saturating_add(1)),
            category: entry.category,
            inputs: entry.inputs,
            output: entry.output,
            size_kb: entry.size_kb,
            operation: entry.operation,
            time: Local::now().format(TIME_FORMAT).to_string(),
        };

        records.insert(0, record.clone());
        records.truncate(self.capacity);
        self.save(&records)?;
        debug!("History now holds {} record(s)", records.len());
        Ok(record)
    }

    /// Remove every record.
    pub fn clear(&self) -> Result<(), ConvertError> {
        self.save(&[])
    }

    fn save(&self, records: &[HistoryRecord]) -> Result<(), ConvertError> {
        let json = serde_json::to_string(records)
            .map_err(|e| ConvertError::Storage(format!("serialise history: {e}")))?;
        self.store.set(&self.key, &json)
    }
}
