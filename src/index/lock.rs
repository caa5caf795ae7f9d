//! Advisory lock guarding index read-modify-write cycles.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Result, ToolsyncError};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive lock on `<index>.lock`, released on drop.
///
/// The lock lives on a sibling file because saves replace the index by
/// rename, which would leave a lock on the old inode behind.
#[derive(Debug)]
pub struct IndexLock {
    file: File,
    path: PathBuf,
}

impl IndexLock {
    /// Lock file path for an index file.
    pub fn lock_path(index_path: &Path) -> PathBuf {
        let mut name = index_path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("index"));
        name.push(".lock");
        index_path.with_file_name(name)
    }

    /// Acquire the lock, polling until `timeout` elapses.
    pub fn acquire(index_path: &Path, timeout: Duration) -> Result<Self> {
        let path = Self::lock_path(index_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    log::debug!("Acquired index lock {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(ToolsyncError::LockTimeout { path, waited });
                    }
                    thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("Failed to release index lock {}: {}", self.path.display(), e);
        }
    }
}
