//! Cross-process per-commit file lock (§4.C operation 3).
//!
//! `fs4`'s `try_lock_exclusive` is the Rust analogue of the source's
//! `fcntl.flock(LOCK_EX | LOCK_NB)`. Acquisition is non-blocking with a
//! bounded retry loop: up to 30 attempts, 1 s apart.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs4::FileExt;

use crate::error::{DeltacovError, Result};

const MAX_ATTEMPTS: u32 = 30;
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

pub struct CommitLock {
    path: PathBuf,
    file: File,
}

impl CommitLock {
    /// Blocks the current thread for up to `MAX_ATTEMPTS * RETRY_INTERVAL`
    /// trying to acquire an exclusive lock on `path`, creating it if needed.
    /// Callers running inside an async context must invoke this through
    /// `tokio::task::spawn_blocking`.
    pub fn acquire(path: &Path) -> Result<CommitLock> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(DeltacovError::Io)?;

        for attempt in 1..=MAX_ATTEMPTS {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(CommitLock {
                        path: path.to_path_buf(),
                        file,
                    })
                }
                Err(_) if attempt < MAX_ATTEMPTS => {
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(_) => return Err(DeltacovError::LockContention(MAX_ATTEMPTS)),
            }
        }
        unreachable!("loop always returns on its last iteration")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CommitLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquires_and_releases_lock() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join(".lock_abc");
        let lock = CommitLock::acquire(&lock_path).unwrap();
        drop(lock);
        // a second acquisition after drop must succeed promptly
        let _lock2 = CommitLock::acquire(&lock_path).unwrap();
    }

    #[test]
    fn second_concurrent_acquisition_fails_fast_in_a_child_process() {
        // True cross-process contention needs two processes; this test
        // verifies the entry point leaves the lock file usable by the
        // next acquirer rather than poisoned.
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join(".lock_def");
        {
            let _lock = CommitLock::acquire(&lock_path).unwrap();
        }
        assert!(CommitLock::acquire(&lock_path).is_ok());
    }
}
