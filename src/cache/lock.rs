//! Per-shard advisory locks
//!
//! Readers take a shared lock, writers and eviction take an exclusive one, so
//! one process never evicts a file another process is writing. The lock is
//! released when the guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::constants::SHARD_LOCK_FILE;
use crate::utils::{BincacheError, IoResultExt, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Advisory lock on one shard directory.
#[derive(Debug)]
pub struct ShardLock {
    lock_path: PathBuf,
    lock_file: File,
}

impl ShardLock {
    /// Block until the shard's lock is held in `mode`.
    ///
    /// Creates the shard directory and its lock file if needed.
    pub fn acquire(shard_dir: &Path, mode: LockMode) -> Result<Self> {
        fs::create_dir_all(shard_dir).with_path(shard_dir)?;

        let lock_path = shard_dir.join(SHARD_LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_path(&lock_path)?;

        Self::lock(&lock_file, mode).map_err(|source| BincacheError::Lock {
            path: lock_path.clone(),
            source,
        })?;

        Ok(Self {
            lock_path,
            lock_file,
        })
    }

    #[cfg(unix)]
    fn lock(file: &File, mode: LockMode) -> std::io::Result<()> {
        use std::os::unix::io::AsRawFd;

        let operation = match mode {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX,
        };

        loop {
            let result = unsafe { libc::flock(file.as_raw_fd(), operation) };
            if result == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    #[cfg(not(unix))]
    fn lock(_file: &File, _mode: LockMode) -> std::io::Result<()> {
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ShardLock {
    fn drop(&mut self) {
        // Closing the file releases the lock too; unlock explicitly anyway
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.lock_file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}
