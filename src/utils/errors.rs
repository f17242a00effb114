use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::{EXIT_COMMAND_NOT_FOUND, EXIT_GENERIC_FAILURE, EXIT_PERMISSION_DENIED};

/// Result alias used across the cache engine
pub type Result<T> = std::result::Result<T, BincacheError>;

/// Main error type for bincache
#[derive(Error, Debug)]
pub enum BincacheError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Entry encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Entry compression error: {0}")]
    Compression(std::io::Error),

    #[error("Invalid fingerprint: {0:?}")]
    InvalidFingerprint(String),

    #[error("Dependency resolution failed for {}: {reason}", binary.display())]
    DependencyResolution { binary: PathBuf, reason: String },

    #[error("Failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stats error: {0}")]
    Stats(#[from] serde_json::Error),
}

/// Why a wrapped command could not be run at all
///
/// A command that runs and exits non-zero is not an error.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("{0}: command not found")]
    NotFound(String),

    #[error("{0}: permission denied")]
    PermissionDenied(String),

    #[error("{command}: OS error {code}")]
    Os { command: String, code: i32 },

    #[error("{command}: {message}")]
    Other { command: String, message: String },
}

impl ExecError {
    /// Classify a spawn failure
    pub fn from_io(command: &str, error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(command.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(command.to_string()),
            _ => match error.raw_os_error() {
                Some(code) => Self::Os {
                    command: command.to_string(),
                    code,
                },
                None => Self::Other {
                    command: command.to_string(),
                    message: error.to_string(),
                },
            },
        }
    }

    /// Shell-style exit status for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) => EXIT_COMMAND_NOT_FOUND,
            Self::PermissionDenied(_) => EXIT_PERMISSION_DENIED,
            Self::Os { .. } | Self::Other { .. } => EXIT_GENERIC_FAILURE,
        }
    }
}

impl BincacheError {
    /// Attach a path to an I/O error
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Extension for tagging `std::io::Result`s with the path they touched
pub trait IoResultExt<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| BincacheError::io(path, e))
    }
}
