//! Primitive file operations the cache is built on
//!
//! Writes are atomic: data lands in a temporary file that is renamed over the
//! destination, so readers see either the old file or the complete new one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::utils::{BincacheError, IoResultExt, Result};

/// Read the contents of a file. `None` if the file does not exist.
pub fn read_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BincacheError::io(path, e)),
    }
}

/// Write `data` to `path` through a temporary file and a rename.
///
/// The temporary file is created in `temp_dir` when given. If that directory
/// turns out to be on another filesystem the write is retried from a
/// temporary file next to `path`.
pub fn write_file(path: &Path, data: &[u8], temp_dir: Option<&Path>) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    if let Some(temp_dir) = temp_dir {
        fs::create_dir_all(temp_dir).with_path(temp_dir)?;
        let temp = write_temp(temp_dir, data)?;
        match temp.persist(path) {
            Ok(_) => return Ok(()),
            Err(e) if is_cross_device(&e.error) => {
                debug!(
                    "Temporary dir {} is on another filesystem, writing next to {}",
                    temp_dir.display(),
                    path.display()
                );
            }
            Err(e) => return Err(BincacheError::io(path, e.error)),
        }
    }

    let temp = write_temp(parent, data)?;
    temp.persist(path)
        .map_err(|e| BincacheError::io(path, e.error))?;
    Ok(())
}

/// Remove a file. Returns whether a file was actually removed.
pub fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BincacheError::io(path, e)),
    }
}

fn write_temp(dir: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let mut temp = NamedTempFile::new_in(dir).with_path(dir)?;
    temp.write_all(data).with_path(temp.path())?;
    temp.as_file().sync_all().with_path(temp.path())?;
    Ok(temp)
}

#[cfg(unix)]
fn is_cross_device(error: &std::io::Error) -> bool {
    error.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_error: &std::io::Error) -> bool {
    false
}
