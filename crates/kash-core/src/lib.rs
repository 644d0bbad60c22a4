//! Kash Core - Shared types, the recency cache, and collaborator traits
//!
//! This crate contains the building blocks used by the disk store.
//! It performs no cache orchestration of its own: the only filesystem
//! access lives behind the [`FileIo`] trait and the config loader.

pub mod config;
pub mod error;
pub mod io;
pub mod lru;
pub mod serializer;
pub mod types;

pub use config::{CacheConfig, Config, LogConfig, MemoryConfig};
pub use error::{KashError, Result};
pub use io::{FileIo, StdFileIo};
pub use lru::RecencyCache;
pub use serializer::{BincodeSerializer, JsonSerializer, Serializer};
pub use types::*;

/// File name of the metadata document inside a cache directory
pub const METADATA_FILENAME: &str = "kash-metadata.json";

/// Cache name used when none is configured
pub const DEFAULT_CACHE_NAME: &str = "kash";

/// Default number of entries held by the memory tier
pub const DEFAULT_MEMORY_ENTRIES: usize = 5;

/// Default single-entry size ceiling for the memory tier (8 KB)
pub const DEFAULT_MEMORY_ENTRY_BYTES: usize = 8 * 1024;
