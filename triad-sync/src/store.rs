//! Property stores backing the token cache.
//!
//! [`MemoryPropertyStore`] keeps everything in memory. [`JsonPropertyStore`]
//! persists a `TokenStoreFile` JSON document at
//! `<home>/.triad/tokens/<subscriber>.json`, using the same atomic `.tmp` +
//! rename pattern as the subscriber config. Writes only mark the store dirty;
//! [`PersistOnFlush`] saves it when the outermost coordinator scope ends.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use triad_core::{
    config::triad_root, PropertyKey, PropertyStore, ProgressMonitor, Resource, ResourceKind,
    ResourcePath, TreeError,
};

use crate::coordinator::{ChangeSet, FlushOperation};
use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// In-memory table shared by both stores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredValue {
    kind: ResourceKind,
    bytes: Vec<u8>,
}

type Table = HashMap<PropertyKey, BTreeMap<ResourcePath, StoredValue>>;

fn table_get(table: &Table, key: &PropertyKey, path: &ResourcePath) -> Option<Vec<u8>> {
    table
        .get(key)
        .and_then(|entries| entries.get(path))
        .map(|v| v.bytes.clone())
}

/// Returns true when the table changed.
fn table_set(table: &mut Table, key: &PropertyKey, resource: &Resource, value: Option<Vec<u8>>) -> bool {
    match value {
        Some(bytes) => {
            let entries = table.entry(key.clone()).or_default();
            let new = StoredValue {
                kind: resource.kind,
                bytes,
            };
            entries.insert(resource.path.clone(), new.clone()) != Some(new)
        }
        None => table
            .get_mut(key)
            .map(|entries| entries.remove(&resource.path).is_some())
            .unwrap_or(false),
    }
}

fn table_clear(table: &mut Table, key: &PropertyKey) -> usize {
    table.remove(key).map(|entries| entries.len()).unwrap_or(0)
}

/// Direct children of `path`, found by a range scan over its `path/` prefix.
fn table_children(table: &Table, key: &PropertyKey, path: &ResourcePath) -> Vec<Resource> {
    let Some(entries) = table.get(key) else {
        return Vec::new();
    };
    let prefix = if path.is_root() {
        String::new()
    } else {
        format!("{}/", path.as_str())
    };
    entries
        .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
        .take_while(|(child, _)| child.as_str().starts_with(&prefix))
        .filter(|(child, _)| !child.is_root() && !child.as_str()[prefix.len()..].contains('/'))
        .map(|(child, value)| Resource::new(child.clone(), value.kind))
        .collect()
}

// ---------------------------------------------------------------------------
// MemoryPropertyStore
// ---------------------------------------------------------------------------

/// Volatile property store.
#[derive(Debug, Default)]
pub struct MemoryPropertyStore {
    table: RwLock<Table>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values stored under `key`.
    pub fn len(&self, key: &PropertyKey) -> usize {
        self.table.read().get(key).map(BTreeMap::len).unwrap_or(0)
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn get(&self, key: &PropertyKey, path: &ResourcePath) -> Result<Option<Vec<u8>>, TreeError> {
        Ok(table_get(&self.table.read(), key, path))
    }

    fn set(&self, key: &PropertyKey, resource: &Resource, value: Option<Vec<u8>>) -> Result<(), TreeError> {
        table_set(&mut self.table.write(), key, resource, value);
        Ok(())
    }

    fn children(&self, key: &PropertyKey, path: &ResourcePath) -> Result<Vec<Resource>, TreeError> {
        Ok(table_children(&self.table.read(), key, path))
    }

    fn clear(&self, key: &PropertyKey) -> Result<usize, TreeError> {
        Ok(table_clear(&mut self.table.write(), key))
    }
}

// ---------------------------------------------------------------------------
// JsonPropertyStore
// ---------------------------------------------------------------------------

/// On-disk token store payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenStoreFile {
    pub synced_at: DateTime<Utc>,
    /// `"<qualifier>:<local>"` → resource path → entry.
    pub entries: BTreeMap<String, BTreeMap<String, StoredEntry>>,
}

/// One persisted token value, hex encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredEntry {
    pub kind: ResourceKind,
    pub value: String,
}

/// Path to the token store JSON for a subscriber, rooted at `home`.
///
/// `~/.triad/tokens/<name>.json`
pub fn store_path_at(home: &Path, name: &str) -> PathBuf {
    triad_root(home).join("tokens").join(format!("{name}.json"))
}

/// File-backed property store with explicit [`save`](JsonPropertyStore::save).
#[derive(Debug)]
pub struct JsonPropertyStore {
    path: PathBuf,
    table: RwLock<Table>,
    synced_at: Mutex<DateTime<Utc>>,
    dirty: AtomicBool,
}

impl JsonPropertyStore {
    /// Load the store for subscriber `name`; a missing file yields an empty store.
    pub fn load_at(home: &Path, name: &str) -> Result<Self, SyncError> {
        let path = store_path_at(home, name);
        if !path.exists() {
            return Ok(Self {
                path,
                table: RwLock::new(Table::new()),
                synced_at: Mutex::new(Utc::now()),
                dirty: AtomicBool::new(false),
            });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let file: TokenStoreFile = serde_json::from_str(&contents)?;
        let table = decode_table(&file)?;
        Ok(Self {
            path,
            table: RwLock::new(table),
            synced_at: Mutex::new(file.synced_at),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn synced_at(&self) -> DateTime<Utc> {
        *self.synced_at.lock()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Save atomically if anything changed since the last save.
    ///
    /// Writes to `<path>.tmp` then renames to `<path>`. Returns whether a
    /// write happened.
    pub fn save(&self) -> Result<bool, SyncError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        let result = self.write_file();
        if result.is_err() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        result.map(|()| true)
    }

    fn write_file(&self) -> Result<(), SyncError> {
        let Some(dir) = self.path.parent() else {
            return Err(io_err(
                &self.path,
                std::io::Error::other("invalid token store path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let now = Utc::now();
        let file = TokenStoreFile {
            synced_at: now,
            entries: encode_table(&self.table.read()),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        *self.synced_at.lock() = now;
        tracing::debug!(path = %self.path.display(), "token store saved");
        Ok(())
    }
}

impl PropertyStore for JsonPropertyStore {
    fn get(&self, key: &PropertyKey, path: &ResourcePath) -> Result<Option<Vec<u8>>, TreeError> {
        Ok(table_get(&self.table.read(), key, path))
    }

    fn set(&self, key: &PropertyKey, resource: &Resource, value: Option<Vec<u8>>) -> Result<(), TreeError> {
        if table_set(&mut self.table.write(), key, resource, value) {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn children(&self, key: &PropertyKey, path: &ResourcePath) -> Result<Vec<Resource>, TreeError> {
        Ok(table_children(&self.table.read(), key, path))
    }

    fn clear(&self, key: &PropertyKey) -> Result<usize, TreeError> {
        let removed = table_clear(&mut self.table.write(), key);
        if removed > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed)
    }
}

fn encode_table(table: &Table) -> BTreeMap<String, BTreeMap<String, StoredEntry>> {
    table
        .iter()
        .filter(|(_, entries)| !entries.is_empty())
        .map(|(key, entries)| {
            let encoded = entries
                .iter()
                .map(|(path, value)| {
                    (
                        path.as_str().to_string(),
                        StoredEntry {
                            kind: value.kind,
                            value: hex::encode(&value.bytes),
                        },
                    )
                })
                .collect();
            (key.to_string(), encoded)
        })
        .collect()
}

fn decode_table(file: &TokenStoreFile) -> Result<Table, SyncError> {
    let mut table = Table::new();
    for (key, entries) in &file.entries {
        let (qualifier, local) = key.split_once(':').unwrap_or(("", key.as_str()));
        let key = PropertyKey::new(qualifier, local);
        let decoded = table.entry(key).or_default();
        for (path, entry) in entries {
            let path = ResourcePath::new(path);
            let bytes = hex::decode(&entry.value).map_err(|e| TreeError::MalformedToken {
                path: path.clone(),
                message: e.to_string(),
            })?;
            decoded.insert(
                path,
                StoredValue {
                    kind: entry.kind,
                    bytes,
                },
            );
        }
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Flush hook
// ---------------------------------------------------------------------------

/// Flush operation that persists a [`JsonPropertyStore`].
pub struct PersistOnFlush {
    store: Arc<JsonPropertyStore>,
}

impl PersistOnFlush {
    pub fn new(store: Arc<JsonPropertyStore>) -> Self {
        Self { store }
    }
}

impl FlushOperation for PersistOnFlush {
    fn flush(&self, changes: ChangeSet, monitor: &mut dyn ProgressMonitor) -> Result<(), SyncError> {
        monitor.sub_task("Saving sync state");
        let written = self.store.save()?;
        if written {
            tracing::info!(
                resources = changes.resources.len(),
                folders = changes.folders.len(),
                path = %self.store.path().display(),
                "persisted sync state",
            );
        }
        Ok(())
    }
}
