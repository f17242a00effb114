use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use xxhash_rust::xxh3::Xxh3;

use crate::constants::HASH_CHUNK_SIZE;
use crate::utils::{BincacheError, IoResultExt, Result};

/// Compute the XXH3-128 digest of a file's content as 32 hex chars.
///
/// Reads in fixed-size chunks so large binaries don't have to fit in memory.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_path(path)?;
    let mut hasher = Xxh3::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(BincacheError::io(path, e)),
        }
    }

    Ok(format!("{:032x}", hasher.digest128()))
}

/// Compute SHA256 of a string as 64 hex chars
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
