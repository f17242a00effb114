use std::path::Path;
use tracing::{debug, warn};

use super::hashing::{hash_file, hash_text};
use super::resolver::{DependencyResolver, LddResolver};
use crate::cache::Fingerprint;
use crate::utils::Result;

/// A shared library the binary links against, with its content hash.
///
/// Libraries without a resolved path (the vDSO, unresolved virtual
/// libraries) carry no hash and take part by name only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub name: String,
    pub path: String,
    pub hash: Option<String>,
}

/// Computes fingerprints for (binary, args) invocations
pub struct SignatureEngine {
    resolver: Box<dyn DependencyResolver>,
}

impl Default for SignatureEngine {
    fn default() -> Self {
        Self::new(Box::new(LddResolver::default()))
    }
}

impl SignatureEngine {
    pub fn new(resolver: Box<dyn DependencyResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve and hash the binary's dependencies, in resolver order.
    ///
    /// Duplicates are kept: two runs that resolve the same library through
    /// different routes should not look identical.
    pub fn dependencies(&self, binary: &Path) -> Result<Vec<DependencyRecord>> {
        let libraries = self.resolver.resolve(binary)?;

        libraries
            .into_iter()
            .map(|library| {
                let hash = if library.path.is_empty() {
                    None
                } else {
                    Some(hash_file(Path::new(&library.path))?)
                };
                Ok(DependencyRecord {
                    name: library.name,
                    path: library.path,
                    hash,
                })
            })
            .collect()
    }

    /// Fingerprint of running `binary` with `args`.
    ///
    /// `Ok(None)` means "don't cache": no binary, or its dependencies could
    /// not be fully resolved and hashed. A binary that can't be read is an
    /// error.
    pub fn signature(&self, binary: &Path, args: &[String]) -> Result<Option<Fingerprint>> {
        if binary.as_os_str().is_empty() {
            return Ok(None);
        }

        let binary_hash = hash_file(binary)?;

        let dependencies = match self.dependencies(binary) {
            Ok(dependencies) => dependencies,
            Err(e) => {
                warn!("No signature for {}: {}", binary.display(), e);
                return Ok(None);
            }
        };

        let source = signature_source(&binary_hash, &dependencies, args);
        let fingerprint = Fingerprint::new(hash_text(&source));
        debug!(
            "Signature of {} with {} dependencies: {}",
            binary.display(),
            dependencies.len(),
            fingerprint
        );
        Ok(Some(fingerprint))
    }
}

/// Text hashed into the fingerprint: binary hash, dependency list, args
pub fn signature_source(
    binary_hash: &str,
    dependencies: &[DependencyRecord],
    args: &[String],
) -> String {
    let dependencies = dependencies
        .iter()
        .map(|record| match &record.hash {
            Some(hash) => format!("({:?}, {:?})", record.path, hash),
            None => format!("({:?})", record.name),
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("{}[{}]{}", binary_hash, dependencies, args.join(" "))
}
