//! Exclusive OS-level lock over a store file.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{StoreError, StoreResult};

/// Holds an exclusive advisory lock for as long as it lives.
///
/// Two restructuring passes against the same journaled store are not safe, so a
/// second opener fails fast instead of waiting.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Open (creating if needed) `path` for read/write and take the lock.
    ///
    /// Returns a handle for I/O alongside the lock guard.
    pub fn open_and_lock(path: &Path) -> StoreResult<(File, Self)> {
        let file = fs_err::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?
            .into_parts()
            .0;
        file.try_lock_exclusive()
            .map_err(|err| StoreError::Locked(format!("{}: {err}", path.display())))?;
        let handle = file.try_clone()?;
        tracing::debug!(lock.path = %path.display(), "store lock acquired");
        Ok((
            handle,
            Self {
                file,
                path: path.to_path_buf(),
            },
        ))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(lock.path = %self.path.display(), error = %err, "store unlock failed");
        }
    }
}
