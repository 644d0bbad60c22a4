//! Disk Store - persistent keyed blob cache
//!
//! Values are stored one file per key under the cache directory and indexed
//! by the metadata document (see [`CacheIndex`]). An optional memory tier
//! keeps recently read small values so repeated reads skip the disk.
//!
//! Lookup order: Index → Memory tier → Disk
//!
//! Every operation holds the store lock for its full duration, including the
//! file I/O. On put the metadata document is written before the payload
//! file: a crash in between leaves an entry whose payload is stale or
//! missing (reported as an I/O error on read) rather than an unindexed file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use kash_core::{
    now_millis, CacheConfig, CacheItem, CacheOption, FileIo, JsonSerializer, KashError,
    RecencyCache, Result, Serializer, StdFileIo,
};

use crate::index::CacheIndex;

/// State guarded by the store lock
struct StoreState {
    index: CacheIndex,
    memory: Option<RecencyCache<String, Bytes>>,
}

/// Counters for store operations
#[derive(Default)]
struct StoreCounters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    writes: AtomicU64,
}

/// Snapshot of store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    /// Items evicted because a read found them expired
    pub expirations: u64,
    pub writes: u64,
    /// Items currently tracked in the metadata document
    pub entries: usize,
    /// Values currently held by the memory tier
    pub memory_entries: usize,
}

/// Persistent keyed blob cache
pub struct DiskStore<S = JsonSerializer> {
    name: String,
    dir: PathBuf,
    state: Mutex<StoreState>,
    /// Values above this size bypass the memory tier
    max_memory_entry_bytes: usize,
    serializer: S,
    io: Arc<dyn FileIo>,
    counters: StoreCounters,
}

impl DiskStore<JsonSerializer> {
    /// Open the store described by `config` with the default JSON serializer
    pub fn open(config: &CacheConfig) -> Result<Self> {
        Self::with_parts(config, JsonSerializer, Arc::new(StdFileIo::new()))
    }
}

impl<S: Serializer> DiskStore<S> {
    /// Open with a custom serializer
    pub fn with_serializer(config: &CacheConfig, serializer: S) -> Result<Self> {
        Self::with_parts(config, serializer, Arc::new(StdFileIo::new()))
    }

    /// Open with a custom serializer and file backend
    ///
    /// Loads (or creates) the metadata document and sweeps expired items
    /// once before returning.
    pub fn with_parts(config: &CacheConfig, serializer: S, io: Arc<dyn FileIo>) -> Result<Self> {
        config.validate()?;

        let dir = config.cache_dir();
        let index = CacheIndex::open(&dir, &config.name, io.clone(), now_millis())?;

        let memory = if config.memory.enabled {
            Some(RecencyCache::new(config.memory.max_entries)?)
        } else {
            None
        };

        debug!(
            "Disk store {:?} opened at {:?}: {} entries, memory tier {}, io {}",
            config.name,
            dir,
            index.len(),
            if memory.is_some() { "on" } else { "off" },
            io.name()
        );

        Ok(Self {
            name: config.name.clone(),
            dir,
            state: Mutex::new(StoreState { index, memory }),
            max_memory_entry_bytes: config.memory.max_entry_bytes,
            serializer,
            io,
            counters: StoreCounters::default(),
        })
    }

    /// Get the bytes stored under `key`
    ///
    /// Returns `Ok(None)` if the key was never cached or has expired. A
    /// payload that cannot be read is an error, never an empty value.
    pub fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut state = self.state.lock();

        let Some(item) = state.index.get(key).cloned() else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        if item.is_expired() {
            debug!("disk_store: {:?} expired, evicting", key);
            self.evict_item(&mut state, key)?;
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        if let Some(memory) = &state.memory {
            if let Some(data) = memory.get(key) {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                trace!("disk_store: memory hit for {:?}", key);
                return Ok(Some(data));
            }
        }

        let path = state.index.path_of(&item);
        let data = Bytes::from(
            self.io
                .read_all(&path)
                .map_err(|e| KashError::io(&path, e))?,
        );
        self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
        trace!("disk_store: disk hit for {:?}, {} bytes", key, data.len());

        if let Some(memory) = &state.memory {
            if data.len() <= self.max_memory_entry_bytes {
                memory.put(key.to_string(), data.clone())?;
            }
        }

        Ok(Some(data))
    }

    /// Get a UTF-8 string stored under `key`
    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key)? {
            Some(data) => String::from_utf8(data.to_vec())
                .map(Some)
                .map_err(|e| KashError::Decode(format!("{:?} is not UTF-8: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Get a value stored under `key`, decoded with the store's serializer
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(data) => self.serializer.decode(&data).map(Some),
            None => Ok(None),
        }
    }

    /// Store bytes under `key`
    ///
    /// A new key gets a freshly allocated payload file; an existing key
    /// keeps its file and only has its expiry replaced.
    pub fn put(&self, key: &str, data: impl Into<Bytes>, option: CacheOption) -> Result<()> {
        if key.is_empty() {
            return Err(KashError::InvalidArgument("cache key must not be empty".into()));
        }
        let data = data.into();

        let mut state = self.state.lock();

        // None for a new key, otherwise the expiry being replaced
        let existing = state.index.get(key).map(|item| item.expired_time);
        let previous = match existing {
            Some(expired_time) => {
                state.index.set_expired_time(key, option.expired_time);
                Some(expired_time)
            }
            None => {
                let filename = state.index.allocate_filename()?;
                state
                    .index
                    .insert(CacheItem::new(key, filename, option.expired_time));
                None
            }
        };

        let path = match state.index.get(key) {
            Some(item) => state.index.path_of(item),
            None => {
                return Err(KashError::InvariantViolation(format!(
                    "{:?} missing from index after put",
                    key
                )))
            }
        };

        let written = state.index.flush().and_then(|()| {
            self.io
                .write_all(&path, &data)
                .map_err(|e| KashError::io(&path, e))
        });
        if let Err(e) = written {
            match previous {
                Some(expired_time) => {
                    state.index.set_expired_time(key, expired_time);
                }
                None => {
                    state.index.remove(key);
                }
            }
            if let Err(restore) = state.index.flush() {
                warn!("Failed to restore metadata after failed put of {:?}: {}", key, restore);
            }
            if let Some(memory) = &state.memory {
                memory.remove(key)?;
            }
            return Err(e);
        }

        if let Some(memory) = &state.memory {
            if data.len() <= self.max_memory_entry_bytes {
                memory.put(key.to_string(), data.clone())?;
            } else {
                memory.remove(key)?;
            }
        }

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        trace!("disk_store: wrote {} bytes for {:?}", data.len(), key);
        Ok(())
    }

    /// Store a string as UTF-8
    pub fn put_string(&self, key: &str, value: &str, option: CacheOption) -> Result<()> {
        self.put(key, Bytes::copy_from_slice(value.as_bytes()), option)
    }

    /// Store a value encoded with the store's serializer
    pub fn put_value<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        option: CacheOption,
    ) -> Result<()> {
        let data = self.serializer.encode(value)?;
        self.put(key, data, option)
    }

    /// Remove `key` and its payload file; returns whether it was present
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if !state.index.contains(key) {
            return Ok(false);
        }
        self.evict_item(&mut state, key)?;
        Ok(true)
    }

    /// Remove every item and every file in the cache directory
    ///
    /// Files without an index entry are removed too. The empty metadata
    /// document is written before any file is deleted and again afterwards,
    /// and the directory itself is kept.
    pub fn evict_all(&self) -> Result<()> {
        let mut state = self.state.lock();

        let count = state.index.clear()?;
        if let Some(memory) = &state.memory {
            memory.evict_all()?;
        }

        // The document is already empty, so a partial delete leaves only orphans
        self.io
            .delete_contents_of(&self.dir)
            .map_err(|e| KashError::io(&self.dir, e))?;
        state.index.flush()?;

        debug!("disk_store: evicted all {} items from {:?}", count, self.dir);
        Ok(())
    }

    /// Evict every expired item now, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let mut state = self.state.lock();
        let removed = state.index.purge_expired(now_millis())?;
        if let Some(memory) = &state.memory {
            for item in &removed {
                memory.remove(item.key.as_str())?;
            }
        }
        self.counters
            .expirations
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        Ok(removed.len())
    }

    /// Number of tracked items (expired items count until they are evicted)
    pub fn size(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether `key` is tracked, without checking expiry
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().index.contains(key)
    }

    /// Metadata for `key`, if tracked
    pub fn item(&self, key: &str) -> Option<CacheItem> {
        self.state.lock().index.get(key).cloned()
    }

    /// Snapshot of every tracked item, in insertion order
    pub fn items(&self) -> Vec<CacheItem> {
        self.state.lock().index.items().to_vec()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state
            .lock()
            .index
            .items()
            .iter()
            .map(|item| item.key.clone())
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            entries: state.index.len(),
            memory_entries: state.memory.as_ref().map(|m| m.size()).unwrap_or(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the metadata document and payload files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Drop `key` from the index, flush, then from the memory tier and disk
    ///
    /// A failed flush puts the item back so the index matches the document.
    fn evict_item(&self, state: &mut StoreState, key: &str) -> Result<()> {
        let Some(item) = state.index.remove(key) else {
            return Ok(());
        };
        if let Err(e) = state.index.flush() {
            state.index.insert(item);
            return Err(e);
        }
        if let Some(memory) = &state.memory {
            memory.remove(key)?;
        }

        let path = state.index.path_of(&item);
        if let Err(e) = self.io.delete(&path) {
            warn!("Failed to delete cache file {:?}: {}", path, e);
            return Err(KashError::io(&path, e));
        }
        Ok(())
    }
}
