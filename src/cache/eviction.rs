//! Size-bounded LRU eviction
//!
//! A sweep walks every shard, and when the total size of all entries is over
//! the limit removes entries oldest-access-first until it no longer is.
//! Sweeps are best-effort: a failed removal is logged and skipped.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::lock::{LockMode, ShardLock};
use super::storage::remove_file;
use crate::constants::SHARD_PREFIX_LEN;
use crate::utils::{BincacheError, Result};

/// One entry file found during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub path: PathBuf,
    pub size: u64,
    pub last_used: SystemTime,
}

/// Outcome of one eviction sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub total_before: u64,
    pub total_after: u64,
    pub removed: Vec<PathBuf>,
}

/// Whether a directory name under the cache root is a shard
pub(crate) fn is_shard_name(name: &str) -> bool {
    name.len() == SHARD_PREFIX_LEN && name.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Whether a file name inside a shard is an entry (not a lock or temp file)
pub(crate) fn is_entry_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.')
}

/// List the shard directories under `root`. A missing root has none.
pub(crate) fn shard_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = match fs::read_dir(root) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BincacheError::io(root, e)),
    };

    let mut shards = Vec::new();
    for entry in read_dir.flatten() {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let is_shard = entry.file_name().to_str().map(is_shard_name).unwrap_or(false);
        if is_dir && is_shard {
            shards.push(entry.path());
        }
    }
    shards.sort();
    Ok(shards)
}

/// Collect size and last-use time of every entry under `root`.
///
/// Entries that vanish mid-scan are skipped.
pub fn scan_entries(root: &Path) -> Result<Vec<EntryInfo>> {
    let mut entries = Vec::new();

    for shard in shard_dirs(root)? {
        let read_dir = match fs::read_dir(&shard) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                warn!("Skipping unreadable shard {}: {}", shard.display(), e);
                continue;
            }
        };

        for entry in read_dir.flatten() {
            let is_entry = entry.file_name().to_str().map(is_entry_name).unwrap_or(false);
            if !is_entry {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let last_used = metadata
                .accessed()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(EntryInfo {
                path: entry.path(),
                size: metadata.len(),
                last_used,
            });
        }
    }

    Ok(entries)
}

/// Bring the total size of entries under `root` down to `max_size`.
pub fn enforce(root: &Path, max_size: u64) -> Result<EvictionReport> {
    Ok(evict(scan_entries(root)?, max_size))
}

/// Remove scanned entries oldest-first until they fit in `max_size`.
///
/// The scan may be out of date by now: entries someone else already removed
/// count as reclaimed, and shards that can't be locked are skipped.
fn evict(mut entries: Vec<EntryInfo>, max_size: u64) -> EvictionReport {
    let total_before: u64 = entries.iter().map(|e| e.size).sum();
    let mut total = total_before;

    if total <= max_size {
        return EvictionReport {
            total_before,
            total_after: total,
            removed: Vec::new(),
        };
    }

    debug!(
        "Cache at {} bytes exceeds limit of {} bytes, evicting",
        total, max_size
    );

    // Oldest first; ties broken by path
    entries.sort_by(|a, b| {
        a.last_used
            .cmp(&b.last_used)
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut removed = Vec::new();
    for entry in entries {
        if total <= max_size {
            break;
        }

        let Some(shard) = entry.path.parent() else {
            continue;
        };
        let _lock = match ShardLock::acquire(shard, LockMode::Exclusive) {
            Ok(lock) => lock,
            Err(e) => {
                warn!("Cannot lock {} for eviction: {}", shard.display(), e);
                continue;
            }
        };

        match remove_file(&entry.path) {
            Ok(true) => {
                total = total.saturating_sub(entry.size);
                removed.push(entry.path);
            }
            Ok(false) => {
                // Someone else got there first; it no longer counts either way
                debug!("Entry {} already gone", entry.path.display());
                total = total.saturating_sub(entry.size);
            }
            Err(e) => warn!("Failed to evict {}: {}", entry.path.display(), e),
        }
    }

    info!(
        "Evicted {} entries, cache now {} bytes (limit {})",
        removed.len(),
        total,
        max_size
    );

    EvictionReport {
        total_before,
        total_after: total,
        removed,
    }
}
