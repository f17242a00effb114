//! Garbage collection of cache debris
//!
//! Cleans up what crashed or interrupted writers leave behind (orphaned
//! temporary files, shard directories without entries) and entries whose
//! binary or libraries have changed since they were stored.
//!
//! An empty shard is unlinked together with its `.lock` while the lock is
//! held. A `put` already blocked on that lock wakes up holding a lock on an
//! unlinked file, and its write then fails because the shard directory is
//! gone. The put reports "not stored" and the next run stores the entry
//! again.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::eviction::{is_entry_name, scan_entries, shard_dirs};
use super::lock::{LockMode, ShardLock};
use super::storage::{read_file, remove_file};
use super::store::decode_envelope;
use super::types::{EntryOrigin, Fingerprint};
use crate::constants::{ORPHAN_TEMP_MAX_AGE_SECS, SHARD_LOCK_FILE};
use crate::utils::Result;

/// What a garbage collection pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub removed_stale_entries: usize,
    pub removed_temp_files: usize,
    pub removed_empty_shards: usize,
}

/// Remove entries whose fingerprint no longer matches their origin.
///
/// `current` recomputes the fingerprint of an origin:
/// - `Ok(Some(fp))` keeps the entry only if `fp` is still its key.
/// - `Ok(None)` means it can't be told right now; the entry is kept.
/// - `Err` means the binary is gone or unreadable; the entry is removed.
///
/// Entries that cannot be decoded are removed too. Entries stored without an
/// origin are kept. Returns the number of entries removed.
pub fn sweep_stale_entries<F>(root: &Path, mut current: F) -> Result<usize>
where
    F: FnMut(&EntryOrigin) -> Result<Option<Fingerprint>>,
{
    let mut removed = 0;

    for entry in scan_entries(root)? {
        let Some(fingerprint) = entry_fingerprint(&entry.path) else {
            continue;
        };
        let Some(shard) = entry.path.parent() else {
            continue;
        };

        let bytes = {
            let _lock = match ShardLock::acquire(shard, LockMode::Shared) {
                Ok(lock) => lock,
                Err(e) => {
                    warn!("Skipping shard {}: {}", shard.display(), e);
                    continue;
                }
            };
            match read_file(&entry.path) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable entry {}: {}", entry.path.display(), e);
                    continue;
                }
            }
        };

        let stale = match decode_envelope(&bytes) {
            Err(e) => {
                debug!("Entry {} is undecodable: {}", entry.path.display(), e);
                true
            }
            Ok(envelope) => match envelope.origin {
                None => false,
                Some(origin) => match current(&origin) {
                    Ok(Some(now)) => now != fingerprint,
                    Ok(None) => false,
                    Err(e) => {
                        debug!("Origin of {} is gone: {}", entry.path.display(), e);
                        true
                    }
                },
            },
        };
        if !stale {
            continue;
        }

        let _lock = match ShardLock::acquire(shard, LockMode::Exclusive) {
            Ok(lock) => lock,
            Err(e) => {
                warn!("Skipping shard {}: {}", shard.display(), e);
                continue;
            }
        };
        if remove_logged(&entry.path) {
            debug!("Removed stale entry {}", fingerprint);
            removed += 1;
        }
    }

    info!("Removed {} stale entries", removed);
    Ok(removed)
}

/// Rebuild the fingerprint an entry file is stored under
fn entry_fingerprint(path: &Path) -> Option<Fingerprint> {
    let name = path.file_name()?.to_str()?;
    let shard = path.parent()?.file_name()?.to_str()?;
    Some(Fingerprint::new(format!("{}{}", shard, name)))
}

/// Collect garbage using the default orphan age of one hour
pub fn collect_garbage(root: &Path, temporary_dir: &Path) -> Result<GcReport> {
    collect_garbage_older_than(
        root,
        temporary_dir,
        Duration::from_secs(ORPHAN_TEMP_MAX_AGE_SECS),
    )
}

/// Remove temporary files older than `max_age` and empty shards
pub fn collect_garbage_older_than(
    root: &Path,
    temporary_dir: &Path,
    max_age: Duration,
) -> Result<GcReport> {
    let mut report = GcReport::default();
    let now = SystemTime::now();

    if let Ok(read_dir) = fs::read_dir(temporary_dir) {
        for entry in read_dir.flatten() {
            if is_stale(&entry, now, max_age) && remove_logged(&entry.path()) {
                report.removed_temp_files += 1;
            }
        }
    }

    for shard in shard_dirs(root)? {
        let _lock = match ShardLock::acquire(&shard, LockMode::Exclusive) {
            Ok(lock) => lock,
            Err(e) => {
                warn!("Skipping shard {}: {}", shard.display(), e);
                continue;
            }
        };

        let Ok(read_dir) = fs::read_dir(&shard) else {
            continue;
        };

        let mut entries = 0usize;
        for entry in read_dir.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_entry_name(&name) {
                entries += 1;
            } else if name.starts_with(".tmp")
                && is_stale(&entry, now, max_age)
                && remove_logged(&entry.path())
            {
                report.removed_temp_files += 1;
            }
        }

        if entries == 0 {
            // Unlinking a held lock file is harmless; the directory goes with it
            let _ = remove_file(&shard.join(SHARD_LOCK_FILE));
            match fs::remove_dir(&shard) {
                Ok(()) => report.removed_empty_shards += 1,
                Err(e) => debug!("Keeping shard {}: {}", shard.display(), e),
            }
        }
    }

    info!(
        "Garbage collection removed {} temporary files and {} empty shards",
        report.removed_temp_files, report.removed_empty_shards
    );
    Ok(report)
}

fn is_stale(entry: &fs::DirEntry, now: SystemTime, max_age: Duration) -> bool {
    let Ok(metadata) = entry.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    now.duration_since(modified).unwrap_or_default() >= max_age
}

fn remove_logged(path: &Path) -> bool {
    match remove_file(path) {
        Ok(removed) => removed,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}
