//! Source access
//!
//! The engine reads files only through [`SourceReader`], so tests can run
//! against an in-memory file set. [`IncludeResolver`] turns an `#include`
//! target into a readable path.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Byte-source capability used for `process_file` and `#include`
pub trait SourceReader: Send + Sync {
    /// Read the full contents of a file
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Check whether a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Stable identity of a path, used for include cycle detection
    fn canonicalize(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// Reads from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

impl SourceReader for FsReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

/// In-memory file set
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file
    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }
}

impl SourceReader for MemoryReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

/// Resolves `#include` targets
#[derive(Debug, Clone, Default)]
pub struct IncludeResolver {
    /// Include search paths
    include_paths: Vec<PathBuf>,
}

impl IncludeResolver {
    /// Create a new resolver
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self { include_paths }
    }

    /// Add an include path
    pub fn add_include_path(&mut self, path: PathBuf) {
        if !self.include_paths.contains(&path) {
            self.include_paths.push(path);
        }
    }

    /// Get all include paths
    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    /// Resolve an include target.
    ///
    /// Relative targets are tried next to the including file, then in each
    /// include path, then as given (relative to the working directory).
    pub fn resolve(
        &self,
        target: &str,
        from_file: Option<&Path>,
        reader: &dyn SourceReader,
    ) -> Option<PathBuf> {
        let target_path = Path::new(target);
        if target_path.is_absolute() {
            return reader.exists(target_path).then(|| target_path.to_path_buf());
        }

        if let Some(parent) = from_file.and_then(Path::parent) {
            let relative_path = parent.join(target_path);
            if reader.exists(&relative_path) {
                debug!("Resolved {} relative to {:?}", target, from_file);
                return Some(relative_path);
            }
        }

        for include_path in &self.include_paths {
            let full_path = include_path.join(target_path);
            if reader.exists(&full_path) {
                debug!("Resolved {} in {:?}", target, include_path);
                return Some(full_path);
            }
        }

        if reader.exists(target_path) {
            debug!("Resolved {} relative to working directory", target);
            return Some(target_path.to_path_buf());
        }

        debug!("Failed to resolve include: {}", target);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_reader() {
        let reader = MemoryReader::new().with_file("a.txt", "alpha");
        assert!(reader.exists(Path::new("a.txt")));
        assert_eq!(reader.read(Path::new("a.txt")).unwrap(), b"alpha");
        assert_eq!(
            reader.read(Path::new("b.txt")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_resolve_order() {
        let reader = MemoryReader::new()
            .with_file("src/part.txt", "next to file")
            .with_file("lib/part.txt", "include path")
            .with_file("lib/only.txt", "include path")
            .with_file("cwd.txt", "working dir");
        let resolver = IncludeResolver::new(vec![PathBuf::from("lib")]);
        let from = Path::new("src/main.php");

        assert_eq!(
            resolver.resolve("part.txt", Some(from), &reader),
            Some(PathBuf::from("src/part.txt"))
        );
        assert_eq!(
            resolver.resolve("part.txt", None, &reader),
            Some(PathBuf::from("lib/part.txt"))
        );
        assert_eq!(
            resolver.resolve("only.txt", Some(from), &reader),
            Some(PathBuf::from("lib/only.txt"))
        );
        assert_eq!(
            resolver.resolve("cwd.txt", Some(from), &reader),
            Some(PathBuf::from("cwd.txt"))
        );
        assert_eq!(resolver.resolve("missing.txt", Some(from), &reader), None);
    }

    #[test]
    fn test_resolve_absolute_on_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("child.txt");
        fs::write(&path, "child").unwrap();

        let resolver = IncludeResolver::default();
        let target = path.to_string_lossy();
        assert_eq!(resolver.resolve(&target, None, &FsReader), Some(path.clone()));
        assert_eq!(FsReader.read(&path).unwrap(), b"child");
    }

    #[test]
    fn test_add_include_path_dedup() {
        let mut resolver = IncludeResolver::default();
        resolver.add_include_path(PathBuf::from("lib"));
        resolver.add_include_path(PathBuf::from("lib"));
        assert_eq!(resolver.include_paths().len(), 1);
    }
}
