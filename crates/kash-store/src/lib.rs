//! Kash Store - persistent keyed blob cache
//!
//! This crate provides:
//! - [`DiskStore`]: values stored as files under a cache directory, indexed
//!   by a JSON metadata document, with an optional in-memory tier
//! - [`CacheIndex`]: the key → item index and its on-disk image
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DiskStore (one lock)                     │
//! │   get / put / remove / evict_all / purge_expired            │
//! └──────────────┬──────────────────┬───────────────────────────┘
//!                │                  │
//!                ▼                  ▼
//! ┌──────────────────────┐  ┌─────────────────────────────────┐
//! │  CacheIndex          │  │  RecencyCache (memory tier)     │
//! │  kash-metadata.json  │  │  optional, count-bounded        │
//! └──────────┬───────────┘  └─────────────────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             FileIo (payload files, one per key)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no background work: expired items are swept once when a store
//! is opened and lazily when a read finds them, or on an explicit
//! [`DiskStore::purge_expired`].

pub mod disk_cache;
pub mod index;

pub use disk_cache::{DiskStore, StoreStats};
pub use index::CacheIndex;
pub use kash_core::{
    BincodeSerializer, CacheConfig, CacheItem, CacheOption, Config, FileIo, JsonSerializer,
    KashError, MemoryConfig, Metadata, RecencyCache, Result, Serializer, StdFileIo,
};
