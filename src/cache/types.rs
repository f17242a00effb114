use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::constants::SHARD_PREFIX_LEN;

/// Key for cache entries: hex digest of a (binary, dependencies, args) tuple
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into (shard, entry file name).
    ///
    /// `None` when the fingerprint cannot name a file safely: empty, no
    /// characters left after the shard prefix, or anything but ASCII
    /// alphanumerics.
    pub fn split(&self) -> Option<(&str, &str)> {
        if self.0.len() <= SHARD_PREFIX_LEN || !self.0.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        Some(self.0.split_at(SHARD_PREFIX_LEN))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The invocation an entry was produced by, kept so garbage collection can
/// recompute its fingerprint later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOrigin {
    pub binary: PathBuf,
    pub args: Vec<String>,
}

impl EntryOrigin {
    pub fn new(binary: impl Into<PathBuf>, args: &[String]) -> Self {
        Self {
            binary: binary.into(),
            args: args.to_vec(),
        }
    }
}

/// On-disk envelope around a compressed, serialized value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub created_at: SystemTime,
    pub origin: Option<EntryOrigin>,
    pub payload: Vec<u8>,
}
