//! Cross-process inventory lock.
//!
//! Serializes every read-modify-write sequence against the inventory file
//! across process boundaries using an advisory OS lock on a dedicated lock
//! file. Advisory locks are released by the kernel when the holding process
//! dies, so a crashed holder can never wedge the pipeline.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::utils::fs::ensure_dir_all_sync;
use crate::{Error, Result};

/// Poll interval while waiting for a contended lock.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(25);

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Named lock tied to the inventory's location.
#[derive(Debug, Clone)]
pub struct InventoryLock {
    path: PathBuf,
    timeout: Duration,
}

impl InventoryLock {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self { path, timeout }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Block until the lock is held or the timeout elapses.
    ///
    /// Returns a guard whose `Drop` releases the lock, so every exit path
    /// of the critical section (including `?` returns) unlocks.
    pub async fn acquire(&self) -> Result<LockGuard> {
        // First acquisition on a fresh deployment also creates the data dir.
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir_all_sync(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(|e| Error::io_path("opening lock file", &self.path, e))?;

        let deadline = Instant::now() + self.timeout;
        let mut contended = false;
        loop {
            match fs2::FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(lock = %self.path.display(), "inventory lock acquired");
                    return Ok(LockGuard { file });
                }
                Err(e) if is_contended(&e) => {
                    if !contended {
                        debug!(lock = %self.path.display(), "inventory lock contended, waiting");
                        contended = true;
                    }
                    if Instant::now() >= deadline {
                        warn!(
                            lock = %self.path.display(),
                            timeout = ?self.timeout,
                            "gave up waiting for inventory lock"
                        );
                        return Err(Error::LockTimeout {
                            path: self.path.clone(),
                            timeout: self.timeout,
                        });
                    }
                    sleep(ACQUIRE_POLL_INTERVAL).await;
                }
                Err(e) => return Err(Error::io_path("locking lock file", &self.path, e)),
            }
        }
    }
}

/// Holds the exclusive lock for the duration of a critical section.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            // The lock still dies with the file descriptor; log and move on.
            warn!("failed to release inventory lock: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock = InventoryLock::new(dir.path().join("inv.lock"), Duration::from_secs(1));

        let guard = lock.acquire().await.unwrap();
        drop(guard);

        // Releasing makes the lock immediately re-acquirable.
        let _guard = lock.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let lock = InventoryLock::new(
            dir.path().join("data/nested/inv.lock"),
            Duration::from_secs(1),
        );
        let _guard = lock.acquire().await.unwrap();
        assert!(dir.path().join("data/nested").is_dir());
    }

    #[tokio::test]
    async fn contended_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inv.lock");
        let holder = InventoryLock::new(path.clone(), Duration::from_secs(1));
        let waiter = InventoryLock::new(path, Duration::from_millis(120));

        let _held = holder.acquire().await.unwrap();
        let err = waiter.acquire().await.unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
    }
}
