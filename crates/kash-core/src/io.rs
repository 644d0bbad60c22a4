//! File access abstraction for the disk store.
//!
//! The store never touches `std::fs` for payloads directly; it goes through
//! [`FileIo`] so tests can substitute failing or instrumented backends.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::trace;

/// Raw file primitives consumed by the disk store.
pub trait FileIo: Send + Sync {
    /// Read the full contents of a file.
    fn read_all(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the contents of a file, creating it if needed.
    fn write_all(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Delete a file, or a directory recursively. A missing path is not an error.
    fn delete(&self, path: &Path) -> io::Result<()>;

    /// Delete everything inside a directory, keeping the directory itself.
    fn delete_contents_of(&self, dir: &Path) -> io::Result<()>;

    /// Name of this backend for logging/debugging.
    fn name(&self) -> &'static str;
}

/// `std::fs` backed implementation.
///
/// Writes go to a sibling `.tmp` file that is synced and renamed over the
/// target, so a reader never sees a partially written payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileIo;

impl StdFileIo {
    pub fn new() -> Self {
        Self
    }
}

impl FileIo for StdFileIo {
    fn read_all(&self, path: &Path) -> io::Result<Vec<u8>> {
        let data = fs::read(path)?;
        trace!("file_io: read {} bytes from {:?}", data.len(), path);
        Ok(data)
    }

    fn write_all(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let temp_path = path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        trace!("file_io: wrote {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        let result = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) => Err(e),
        };

        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn delete_contents_of(&self, dir: &Path) -> io::Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        for entry in entries {
            self.delete(&entry?.path())?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "std::fs"
    }
}
