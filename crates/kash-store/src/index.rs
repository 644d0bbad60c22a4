//! Cache Index - key → item lookup backed by the metadata document
//!
//! The index owns the [`Metadata`] record and a map from key to the item's
//! position in `Metadata::items`. Both are only ever changed together, so
//! every key in the map has exactly one item and vice versa.
//!
//! # File Layout
//! ```text
//! <root>/<name>/
//! ├── kash-metadata.json   # Metadata, rewritten in full on every flush
//! ├── 3f9a0c...            # Payload file, one per item
//! └── b27e41...
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use kash_core::types::allocate_filename;
use kash_core::{CacheItem, EpochMillis, FileIo, KashError, Metadata, Result, METADATA_FILENAME};

/// In-memory index over the persisted metadata document
pub struct CacheIndex {
    dir: PathBuf,
    metadata_path: PathBuf,
    metadata: Metadata,
    /// key → position in `metadata.items`
    positions: HashMap<String, usize>,
    io: Arc<dyn FileIo>,
}

impl CacheIndex {
    /// Load the metadata document in `dir`, or create an empty one
    ///
    /// Expired items are swept before the index is returned.
    pub fn open(dir: &Path, name: &str, io: Arc<dyn FileIo>, now: EpochMillis) -> Result<Self> {
        let metadata_path = dir.join(METADATA_FILENAME);

        let metadata = if metadata_path.exists() {
            let data = io
                .read_all(&metadata_path)
                .map_err(|e| KashError::io(&metadata_path, e))?;
            let metadata: Metadata =
                serde_json::from_slice(&data).map_err(|e| KashError::CorruptMetadata {
                    path: metadata_path.clone(),
                    source: e,
                })?;
            if metadata.name != name {
                debug!(
                    "Metadata at {:?} is named {:?}, opened as {:?}",
                    metadata_path, metadata.name, name
                );
            }
            Some(metadata)
        } else {
            fs::create_dir_all(dir).map_err(|e| {
                KashError::Configuration(format!("cannot create cache directory {:?}: {}", dir, e))
            })?;
            None
        };

        let created = metadata.is_none();
        let mut index = Self {
            dir: dir.to_path_buf(),
            metadata_path,
            metadata: metadata.unwrap_or_else(|| Metadata::new(name)),
            positions: HashMap::new(),
            io,
        };
        let dropped = index.rebuild();

        if created || dropped > 0 {
            index.flush()?;
        }
        if created {
            info!("Created cache {:?} at {:?}", name, dir);
        }

        let swept = index.purge_expired(now)?;
        debug!(
            "Cache index loaded: {} entries, {} expired on startup",
            index.len(),
            swept.len()
        );

        Ok(index)
    }

    /// Rebuild `positions` from `metadata.items`
    ///
    /// Items with unusable filenames are dropped; for duplicate keys the last
    /// occurrence wins.
    fn rebuild(&mut self) -> usize {
        let items = std::mem::take(&mut self.metadata.items);
        let mut latest: HashMap<String, usize> = HashMap::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            if !is_plain_filename(&item.filename) {
                warn!(
                    "Dropping cache item {:?} with unusable filename {:?}",
                    item.key, item.filename
                );
                continue;
            }
            latest.insert(item.key.clone(), i);
        }

        let dropped = items.len() - latest.len();
        if dropped > 0 {
            warn!("Dropped {} unusable or duplicate metadata items", dropped);
        }

        self.metadata.items = items
            .into_iter()
            .enumerate()
            .filter(|(i, item)| latest.get(&item.key) == Some(i))
            .map(|(_, item)| item)
            .collect();
        self.positions = self
            .metadata
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.key.clone(), i))
            .collect();
        dropped
    }

    /// Remove every item expired at `now`, deleting its payload file
    ///
    /// Delete failures are logged and otherwise ignored. The document is
    /// flushed if anything was removed.
    pub fn purge_expired(&mut self, now: EpochMillis) -> Result<Vec<CacheItem>> {
        let expired: Vec<String> = self
            .metadata
            .items
            .iter()
            .filter(|item| item.is_expired_at(now))
            .map(|item| item.key.clone())
            .collect();

        if expired.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(item) = self.remove(&key) {
                let path = self.path_of(&item);
                if let Err(e) = self.io.delete(&path) {
                    warn!("Failed to delete expired cache file {:?}: {}", path, e);
                }
                removed.push(item);
            }
        }

        self.flush()?;
        debug!("Purged {} expired cache items", removed.len());
        Ok(removed)
    }

    /// Write the whole metadata document, replacing the previous one
    pub fn flush(&self) -> Result<()> {
        self.write_document(&self.metadata)
    }

    fn write_document(&self, metadata: &Metadata) -> Result<()> {
        let data = serde_json::to_vec_pretty(metadata)
            .map_err(|e| KashError::Serialization(e.to_string()))?;
        self.io
            .write_all(&self.metadata_path, &data)
            .map_err(|e| KashError::io(&self.metadata_path, e))
    }

    pub fn get(&self, key: &str) -> Option<&CacheItem> {
        self.positions
            .get(key)
            .and_then(|&i| self.metadata.items.get(i))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Append a new item, replacing any item with the same key
    pub fn insert(&mut self, item: CacheItem) {
        if let Some(&i) = self.positions.get(&item.key) {
            self.metadata.items[i] = item;
            return;
        }
        self.positions
            .insert(item.key.clone(), self.metadata.items.len());
        self.metadata.items.push(item);
    }

    /// Replace the expiry of an existing item
    pub fn set_expired_time(&mut self, key: &str, expired_time: Option<EpochMillis>) -> bool {
        match self.positions.get(key) {
            Some(&i) => {
                self.metadata.items[i].expired_time = expired_time;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheItem> {
        let i = self.positions.remove(key)?;
        let item = self.metadata.items.remove(i);
        for pos in self.positions.values_mut() {
            if *pos > i {
                *pos -= 1;
            }
        }
        Some(item)
    }

    /// Drop every item, returning how many there were
    ///
    /// The empty document is written first; on failure nothing changes.
    /// Payload files are left to the caller.
    pub fn clear(&mut self) -> Result<usize> {
        self.write_document(&Metadata::new(self.metadata.name.clone()))?;
        let count = self.metadata.items.len();
        self.metadata.items.clear();
        self.positions.clear();
        Ok(count)
    }

    /// Allocate a payload filename not used by any current item
    pub fn allocate_filename(&self) -> Result<String> {
        loop {
            let filename = allocate_filename()?;
            if !self.metadata.items.iter().any(|item| item.filename == filename) {
                return Ok(filename);
            }
        }
    }

    pub fn path_of(&self, item: &CacheItem) -> PathBuf {
        self.dir.join(&item.filename)
    }

    pub fn len(&self) -> usize {
        self.metadata.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.items.is_empty()
    }

    /// Items in insertion order
    pub fn items(&self) -> &[CacheItem] {
        &self.metadata.items
    }
}

/// A filename that stays inside the cache directory and is not the metadata document
fn is_plain_filename(filename: &str) -> bool {
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && filename != METADATA_FILENAME
}

impl std::fmt::Debug for CacheIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheIndex")
            .field("dir", &self.dir)
            .field("entries", &self.metadata.items.len())
            .field("io", &self.io.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kash_core::{now_millis, StdFileIo};
    use tempfile::TempDir;

    fn open(dir: &Path) -> CacheIndex {
        CacheIndex::open(dir, "kash", Arc::new(StdFileIo), now_millis()).unwrap()
    }

    fn read_metadata(dir: &Path) -> Metadata {
        let data = fs::read(dir.join(METADATA_FILENAME)).unwrap();
        serde_json::from_slice(&data).unwrap()
    }

    #[test]
    fn test_open_creates_dir_and_document() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("a").join("kash");

        let index = open(&dir);

        assert!(dir.is_dir());
        assert!(index.is_empty());
        assert_eq!(read_metadata(&dir), Metadata::new("kash"));
    }

    #[test]
    fn test_insert_remove_keeps_positions_aligned() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = open(temp_dir.path());

        for key in ["a", "b", "c", "d"] {
            index.insert(CacheItem::new(key, format!("f-{}", key), None));
        }
        index.remove("b");

        assert_eq!(index.len(), 3);
        for key in ["a", "c", "d"] {
            assert_eq!(index.get(key).unwrap().key, key);
        }
        assert!(index.get("b").is_none());
        let keys: Vec<_> = index.items().iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_flush_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut index = open(temp_dir.path());
            index.insert(CacheItem::new("a", "fa".into(), None));
            index.insert(CacheItem::new("b", "fb".into(), Some(u64::MAX)));
            index.flush().unwrap();
        }

        let index = open(temp_dir.path());
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("b").unwrap().expired_time, Some(u64::MAX));
    }

    #[test]
    fn test_startup_sweep_removes_expired() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut index = open(temp_dir.path());
            index.insert(CacheItem::new("live", "flive".into(), None));
            index.insert(CacheItem::new("dead", "fdead".into(), Some(1)));
            index.flush().unwrap();
        }
        fs::write(temp_dir.path().join("flive"), b"live").unwrap();
        fs::write(temp_dir.path().join("fdead"), b"dead").unwrap();

        let index = open(temp_dir.path());

        assert!(index.contains("live"));
        assert!(!index.contains("dead"));
        assert!(temp_dir.path().join("flive").exists());
        assert!(!temp_dir.path().join("fdead").exists());
        assert_eq!(read_metadata(temp_dir.path()).items.len(), 1);
    }

    #[test]
    fn test_duplicate_and_unsafe_items_dropped_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let doc = r#"{
            "name": "kash",
            "items": [
                {"key": "a", "filename": "old", "createdTime": 1, "expiredTime": null},
                {"key": "evil", "filename": "../outside", "createdTime": 1, "expiredTime": null},
                {"key": "meta", "filename": "kash-metadata.json", "createdTime": 1, "expiredTime": null},
                {"key": "a", "filename": "new", "createdTime": 2, "expiredTime": null}
            ]
        }"#;
        fs::write(temp_dir.path().join(METADATA_FILENAME), doc).unwrap();

        let index = open(temp_dir.path());

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a").unwrap().filename, "new");
        assert!(!index.contains("evil"));
        assert!(!index.contains("meta"));
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(METADATA_FILENAME), b"{not json").unwrap();

        let result = CacheIndex::open(temp_dir.path(), "kash", Arc::new(StdFileIo), now_millis());
        assert!(matches!(result, Err(KashError::CorruptMetadata { .. })));
    }

    #[test]
    fn test_uncreatable_dir_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let result = CacheIndex::open(&blocker.join("kash"), "kash", Arc::new(StdFileIo), now_millis());
        assert!(matches!(result, Err(KashError::Configuration(_))));
    }

    #[test]
    fn test_allocated_filenames_unique() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = open(temp_dir.path());
        for i in 0..50 {
            let filename = index.allocate_filename().unwrap();
            index.insert(CacheItem::new(format!("k{}", i), filename, None));
        }

        let mut names: Vec<_> = index.items().iter().map(|i| i.filename.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 50);
    }

    #[test]
    fn test_clear_writes_empty_document() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = open(temp_dir.path());
        for key in ["a", "b"] {
            index.insert(CacheItem::new(key, format!("f-{}", key), None));
        }
        index.flush().unwrap();

        assert_eq!(index.clear().unwrap(), 2);

        assert!(index.is_empty());
        assert!(!index.contains("a"));
        assert_eq!(read_metadata(temp_dir.path()), Metadata::new("kash"));
        assert!(open(temp_dir.path()).is_empty());
    }
}
