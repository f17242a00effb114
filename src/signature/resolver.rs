//! Dynamic library dependency resolution
//!
//! The signature engine only sees the `DependencyResolver` trait; the
//! production implementation asks the dynamic linker through `ldd`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::utils::{BincacheError, Result};

/// One line of dynamic linker output: any field may be empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedLibrary {
    pub name: String,
    pub path: String,
    pub address: String,
}

impl LinkedLibrary {
    pub fn new(name: &str, path: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            address: address.to_string(),
        }
    }
}

/// Lists the shared libraries a binary links against, in linker order
#[cfg_attr(test, mockall::automock)]
pub trait DependencyResolver {
    fn resolve(&self, binary: &Path) -> Result<Vec<LinkedLibrary>>;
}

/// Resolver backed by `ldd`
#[derive(Debug, Clone)]
pub struct LddResolver {
    program: PathBuf,
}

impl Default for LddResolver {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ldd"),
        }
    }
}

impl LddResolver {
    /// Use a different `ldd`-compatible program
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DependencyResolver for LddResolver {
    fn resolve(&self, binary: &Path) -> Result<Vec<LinkedLibrary>> {
        let output = Command::new(&self.program)
            .arg(binary)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| BincacheError::DependencyResolution {
                binary: binary.to_path_buf(),
                reason: format!("failed to run {}: {}", self.program.display(), e),
            })?;

        if !output.status.success() {
            return Err(BincacheError::DependencyResolution {
                binary: binary.to_path_buf(),
                reason: format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(parse_ldd_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `ldd` output into libraries, keeping order and duplicates.
///
/// Handles the three line shapes ldd prints:
/// `name => path (addr)`, `name =>  (addr)` and `/path (addr)`.
pub fn parse_ldd_output(output: &str) -> Vec<LinkedLibrary> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_ldd_line)
        .collect()
}

const LDD_NOT_FOUND: &str = "not found";

fn parse_ldd_line(line: &str) -> LinkedLibrary {
    let mut rest = line;
    let mut address = "";

    if let (Some(open), Some(close)) = (line.find('('), line.find(')')) {
        if open < close {
            address = line[open + 1..close].trim();
            rest = line[..open].trim();
        }
    }

    if let Some((name, path)) = rest.split_once("=>") {
        let path = path.trim();
        // The linker could not find it: the library counts by name only
        let path = if path == LDD_NOT_FOUND { "" } else { path };
        LinkedLibrary::new(name.trim(), path, address)
    } else if rest.starts_with('/') {
        LinkedLibrary::new("", rest, address)
    } else {
        LinkedLibrary::new(rest, "", address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_ldd_output() {
        let output = "
    linux-vdso.so.1 =>  (0x00007fff6ab93000)
\tlibstdc++.so.6 => /lib64/libstdc++.so.6 (0x00007fc5c64c6000)
\tlibm.so.6 => /lib64/libm.so.6 (0x00007fc5c61c4000)
\tlibgcc_s.so.1 => /lib64/libgcc_s.so.1 (0x00007fc5c5fad000)
\tlibc.so.6 => /lib64/libc.so.6 (0x00007fc5c5bdf000)
\t/lib64/ld-linux-x86-64.so.2 (0x00007fc5c6853000)
    ";

        let expected = vec![
            LinkedLibrary::new("linux-vdso.so.1", "", "0x00007fff6ab93000"),
            LinkedLibrary::new("libstdc++.so.6", "/lib64/libstdc++.so.6", "0x00007fc5c64c6000"),
            LinkedLibrary::new("libm.so.6", "/lib64/libm.so.6", "0x00007fc5c61c4000"),
            LinkedLibrary::new("libgcc_s.so.1", "/lib64/libgcc_s.so.1", "0x00007fc5c5fad000"),
            LinkedLibrary::new("libc.so.6", "/lib64/libc.so.6", "0x00007fc5c5bdf000"),
            LinkedLibrary::new("", "/lib64/ld-linux-x86-64.so.2", "0x00007fc5c6853000"),
        ];

        assert_eq!(parse_ldd_output(output), expected);
    }

    #[test]
    fn test_parse_keeps_duplicates_and_bare_names() {
        let output = "libfoo.so => /a/libfoo.so (0x1)\nlibfoo.so => /a/libfoo.so (0x2)\nstatically linked\n";
        let libs = parse_ldd_output(output);

        assert_eq!(libs.len(), 3);
        assert_eq!(libs[0].path, libs[1].path);
        assert_eq!(libs[2], LinkedLibrary::new("statically linked", "", ""));
    }

    #[test]
    fn test_parse_not_found_library() {
        let libs = parse_ldd_output("\tlibmissing.so => not found\n");
        assert_eq!(libs, vec![LinkedLibrary::new("libmissing.so", "", "")]);
    }

    #[test]
    #[cfg(unix)]
    fn test_failing_resolver_program() {
        let resolver = LddResolver::with_program("false");
        let err = resolver.resolve(Path::new("/bin/sh")).unwrap_err();
        assert!(matches!(err, BincacheError::DependencyResolution { .. }));
    }

    #[test]
    fn test_missing_resolver_program() {
        let resolver = LddResolver::with_program("/nonexistent/ldd");
        assert!(resolver.resolve(Path::new("/bin/sh")).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_silent_resolver_program() {
        let resolver = LddResolver::with_program("true");
        assert_eq!(resolver.resolve(Path::new("/bin/sh")).unwrap(), vec![]);
    }
}
