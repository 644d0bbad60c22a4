//! Core type definitions for Kash
//!
//! These types make up the metadata document that is persisted next to the
//! cached payload files, plus the per-put options.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{KashError, Result};

/// Milliseconds since the Unix epoch
pub type EpochMillis = u64;

/// Number of random bytes in an allocated payload filename
const FILENAME_BYTES: usize = 16;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as EpochMillis
}

/// Allocate a fresh payload filename (32 hex chars, unrelated to the key)
pub fn allocate_filename() -> Result<String> {
    let mut buf = [0u8; FILENAME_BYTES];
    getrandom::fill(&mut buf)
        .map_err(|e| KashError::Configuration(format!("OS randomness unavailable: {}", e)))?;
    Ok(hex::encode(buf))
}

/// Metadata record for one cached key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheItem {
    pub key: String,
    /// Payload file name inside the cache directory
    pub filename: String,
    pub created_time: EpochMillis,
    pub expired_time: Option<EpochMillis>,
}

impl CacheItem {
    pub fn new(key: impl Into<String>, filename: String, expired_time: Option<EpochMillis>) -> Self {
        Self {
            key: key.into(),
            filename,
            created_time: now_millis(),
            expired_time,
        }
    }

    /// Whether the item has expired at `now`
    pub fn is_expired_at(&self, now: EpochMillis) -> bool {
        matches!(self.expired_time, Some(expired) if now >= expired)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

/// The durable record of a cache, serialized as `kash-metadata.json`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub items: Vec<CacheItem>,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }
}

/// Options applied when putting a value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheOption {
    /// Absolute expiry instant; `None` never expires
    pub expired_time: Option<EpochMillis>,
}

impl CacheOption {
    /// No options: the value never expires
    pub const fn empty() -> Self {
        Self { expired_time: None }
    }

    /// Expire at an absolute instant
    pub const fn expires_at(expired_time: EpochMillis) -> Self {
        Self {
            expired_time: Some(expired_time),
        }
    }

    /// Expire `ttl` from now
    pub fn expires_in(ttl: Duration) -> Self {
        Self::expires_at(now_millis().saturating_add(ttl.as_millis() as EpochMillis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_expiry() {
        let mut item = CacheItem::new("k", "f".into(), None);
        assert!(!item.is_expired_at(u64::MAX));

        item.expired_time = Some(1000);
        assert!(!item.is_expired_at(999));
        assert!(item.is_expired_at(1000));
        assert!(item.is_expired_at(1001));
    }

    #[test]
    fn test_allocated_filenames_are_hex_and_distinct() {
        let a = allocate_filename().unwrap();
        let b = allocate_filename().unwrap();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_metadata_json_schema() {
        let metadata = Metadata {
            name: "kash".into(),
            items: vec![CacheItem {
                key: "user:1".into(),
                filename: "00ff".into(),
                created_time: 1_700_000_000_000,
                expired_time: None,
            }],
        };

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["name"], "kash");
        assert_eq!(json["items"][0]["key"], "user:1");
        assert_eq!(json["items"][0]["createdTime"], 1_700_000_000_000u64);
        assert!(json["items"][0]["expiredTime"].is_null());
    }

    #[test]
    fn test_metadata_accepts_missing_expiry() {
        let json = r#"{"name":"kash","items":[{"key":"a","filename":"f","createdTime":1}]}"#;
        let metadata: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.items[0].expired_time, None);
    }

    #[test]
    fn test_expires_in_is_in_the_future() {
        let before = now_millis();
        let option = CacheOption::expires_in(Duration::from_secs(60));
        assert!(option.expired_time.unwrap() >= before + 60_000);
        assert_eq!(CacheOption::empty().expired_time, None);
    }
}
