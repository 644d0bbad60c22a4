//! Error types for Kash

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the Kash crates
pub type Result<T> = std::result::Result<T, KashError>;

/// Errors surfaced by the recency cache and the disk store
///
/// A key that was never cached (or has expired) is not an error: lookups
/// return `Ok(None)` for that case.
#[derive(Error, Debug)]
pub enum KashError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt metadata document {path:?}: {source}")]
    CorruptMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl KashError {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        KashError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error leaves the cache in a state that must not be used further
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KashError::Configuration(_) | KashError::InvariantViolation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_names_path() {
        let err = KashError::io(
            "/cache/kash/abc",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/cache/kash/abc"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(KashError::Configuration("x".into()).is_fatal());
        assert!(KashError::InvariantViolation("x".into()).is_fatal());
        assert!(!KashError::InvalidArgument("x".into()).is_fatal());
        assert!(!KashError::Decode("x".into()).is_fatal());
    }
}
