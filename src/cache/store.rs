use serde::{de::DeserializeOwned, Serialize};
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use super::eviction::enforce;
use super::lock::{LockMode, ShardLock};
use super::storage::{read_file, write_file};
use super::types::{EntryOrigin, Fingerprint, StoredEntry};
use crate::app::Config;
use crate::utils::{BincacheError, Result};

/// Sharded on-disk store mapping fingerprints to serialized values
///
/// Layout: `<root>/<fp[..2]>/<fp[2..]>`. Every `put` is followed by an
/// eviction sweep that keeps the store under `max_size` bytes.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    temporary_dir: Option<PathBuf>,
    max_size: u64,
}

impl CacheStore {
    /// Create a store; entries are written via temporary files next to them
    pub fn new(root: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            root: root.into(),
            temporary_dir: None,
            max_size,
        }
    }

    /// Stage writes in `dir` instead of the shard directory
    pub fn with_temporary_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temporary_dir = Some(dir.into());
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.cache_dir, config.max_size).with_temporary_dir(&config.temporary_dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn temporary_dir(&self) -> Option<&Path> {
        self.temporary_dir.as_deref()
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Entry file path for a fingerprint, if it is usable as a key
    pub fn entry_path(&self, fingerprint: &Fingerprint) -> Option<PathBuf> {
        let (shard, name) = fingerprint.split()?;
        Some(self.root.join(shard).join(name))
    }

    /// Load the value stored under `fingerprint`.
    ///
    /// `Ok(None)` for unknown or unusable keys. A hit refreshes the entry's
    /// access time so eviction sees it as recently used.
    pub fn get<T>(&self, fingerprint: &Fingerprint) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(path) = self.entry_path(fingerprint) else {
            return Ok(None);
        };
        let Some(shard) = path.parent() else {
            return Ok(None);
        };
        // Don't create shard directories just to look something up
        if !shard.is_dir() {
            return Ok(None);
        }

        let _lock = ShardLock::acquire(shard, LockMode::Shared)?;
        let Some(bytes) = read_file(&path)? else {
            return Ok(None);
        };
        let value = decode(&bytes)?;
        touch(&path);

        Ok(Some(value))
    }

    /// Store `value` under `fingerprint`, then run an eviction sweep.
    ///
    /// Eviction problems are logged, not returned: the value is stored.
    pub fn put<T>(&self, fingerprint: &Fingerprint, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_entry(fingerprint, value, None)
    }

    /// Like [`put`](Self::put), also recording the invocation the value came
    /// from so `--gc` can tell when the entry has gone stale.
    pub fn put_with_origin<T>(
        &self,
        fingerprint: &Fingerprint,
        value: &T,
        origin: &EntryOrigin,
    ) -> Result<()>
    where
        T: Serialize,
    {
        self.write_entry(fingerprint, value, Some(origin))
    }

    fn write_entry<T>(
        &self,
        fingerprint: &Fingerprint,
        value: &T,
        origin: Option<&EntryOrigin>,
    ) -> Result<()>
    where
        T: Serialize,
    {
        let path = self
            .entry_path(fingerprint)
            .ok_or_else(|| BincacheError::InvalidFingerprint(fingerprint.to_string()))?;
        let Some(shard) = path.parent() else {
            return Err(BincacheError::InvalidFingerprint(fingerprint.to_string()));
        };

        let data = encode(value, origin)?;
        {
            let _lock = ShardLock::acquire(shard, LockMode::Exclusive)?;
            write_file(&path, &data, self.temporary_dir.as_deref())?;
        }
        debug!("Stored {} ({} bytes)", fingerprint, data.len());

        match enforce(&self.root, self.max_size) {
            Ok(report) if !report.removed.is_empty() => {
                debug!("Eviction removed {} entries", report.removed.len());
            }
            Ok(_) => {}
            Err(e) => warn!("Eviction sweep failed: {}", e),
        }

        Ok(())
    }
}

fn encode<T: Serialize>(value: &T, origin: Option<&EntryOrigin>) -> Result<Vec<u8>> {
    let serialized = bincode::serialize(value)?;
    let payload =
        lz4::block::compress(&serialized, None, true).map_err(BincacheError::Compression)?;
    let entry = StoredEntry {
        created_at: SystemTime::now(),
        origin: origin.cloned(),
        payload,
    };
    Ok(bincode::serialize(&entry)?)
}

/// Read an entry's envelope without decompressing the value
pub(crate) fn decode_envelope(bytes: &[u8]) -> Result<StoredEntry> {
    Ok(bincode::deserialize(bytes)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let entry = decode_envelope(bytes)?;
    let serialized =
        lz4::block::decompress(&entry.payload, None).map_err(BincacheError::Compression)?;
    Ok(bincode::deserialize(&serialized)?)
}

/// Best-effort access time bump; many mounts don't update atime on read
fn touch(path: &Path) {
    let result = File::open(path)
        .and_then(|file| file.set_times(FileTimes::new().set_accessed(SystemTime::now())));
    if let Err(e) = result {
        debug!("Could not refresh access time of {}: {}", path.display(), e);
    }
}
