//! Output cache
//!
//! Processed output lives in `<dir>/<hash>.out`, one file per source path,
//! and `<dir>/index.json` records the fingerprint each output was built
//! from. An output is only served while the source file and the load
//! options still match that fingerprint.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dpp_core::{ConditionalMode, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::LoadOptions;

const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;

/// What an output was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Fingerprint {
    mtime: u64,
    content: u64,
    options: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    fingerprint: Fingerprint,
    /// Output file name, relative to the cache directory
    output: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Index {
    version: u32,
    entries: BTreeMap<PathBuf, IndexEntry>,
}

impl Default for Index {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// The bytes of a source file as read for one build.
///
/// The mtime is taken before the read, so an edit racing the build leaves
/// an entry that no longer matches the file.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    bytes: Vec<u8>,
    mtime: u64,
}

impl SourceSnapshot {
    pub fn read(path: &Path) -> Result<Self> {
        let mtime = mtime(path)?;
        let bytes = fs::read(path)?;
        Ok(Self { bytes, mtime })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// On-disk cache of processed output, keyed by source path
pub struct PreprocessCache {
    dir: PathBuf,
    index: Index,
}

impl PreprocessCache {
    /// Open (or create) a cache in `dir`
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let index = load_index(&dir)?;
        Ok(Self { dir, index })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cached output for `source`, if it is still fresh
    pub fn get(&self, source: &Path, options: &LoadOptions) -> Option<Vec<u8>> {
        let entry = self.index.entries.get(source)?;
        let fingerprint = entry.fingerprint;
        if fingerprint.options != options_hash(options) {
            debug!("Options changed for {:?}", source);
            return None;
        }
        // mtime first; the content hash reads the whole file
        if mtime(source).ok()? != fingerprint.mtime
            || hash_bytes(&fs::read(source).ok()?) != fingerprint.content
        {
            debug!("Source changed: {:?}", source);
            return None;
        }
        fs::read(self.dir.join(&entry.output)).ok()
    }

    /// Store `output`, built from `snapshot` of `source`
    pub fn put(
        &mut self,
        source: &Path,
        options: &LoadOptions,
        snapshot: &SourceSnapshot,
        output: &[u8],
    ) -> Result<()> {
        let entry = IndexEntry {
            fingerprint: Fingerprint {
                mtime: snapshot.mtime,
                content: hash_bytes(&snapshot.bytes),
                options: options_hash(options),
            },
            output: output_name(source),
        };
        fs::write(self.dir.join(&entry.output), output)?;
        self.index.entries.insert(source.to_path_buf(), entry);
        self.save_index()
    }

    /// Drop the entry for one source file
    pub fn invalidate(&mut self, source: &Path) -> Result<()> {
        if let Some(entry) = self.index.entries.remove(source) {
            remove_output(&self.dir.join(&entry.output))?;
        }
        self.save_index()
    }

    /// Drop every entry
    pub fn clear(&mut self) -> Result<()> {
        for entry in self.index.entries.values() {
            remove_output(&self.dir.join(&entry.output))?;
        }
        self.index.entries.clear();
        self.save_index()
    }

    pub fn stats(&self) -> CacheStats {
        let total_size = self
            .index
            .entries
            .values()
            .filter_map(|e| fs::metadata(self.dir.join(&e.output)).ok())
            .map(|m| m.len())
            .sum();

        CacheStats {
            total_entries: self.index.entries.len(),
            total_size,
        }
    }

    fn save_index(&self) -> Result<()> {
        let path = self.dir.join(INDEX_FILE);
        let content = serde_json::to_string_pretty(&self.index)
            .map_err(|e| Error::Cache(format!("{}: {}", path.display(), e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

fn load_index(dir: &Path) -> Result<Index> {
    let path = dir.join(INDEX_FILE);
    if !path.exists() {
        return Ok(Index::default());
    }
    let content = fs::read_to_string(&path)?;
    let index: Index = serde_json::from_str(&content)
        .map_err(|e| Error::Cache(format!("{}: {}", path.display(), e)))?;
    if index.version != INDEX_VERSION {
        debug!("Discarding cache index version {}", index.version);
        return Ok(Index::default());
    }
    Ok(index)
}

/// A missing output file is already removed
fn remove_output(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn output_name(source: &Path) -> PathBuf {
    let hash = hash_bytes(source.to_string_lossy().as_bytes());
    PathBuf::from(format!("{:016x}.out", hash))
}

/// Fingerprint of everything besides the source that affects output
fn options_hash(options: &LoadOptions) -> u64 {
    let mut hasher = DefaultHasher::new();
    let engine = &options.engine;

    matches!(engine.conditional_mode, ConditionalMode::Nested).hash(&mut hasher);
    engine.persist_macros.hash(&mut hasher);
    engine.recursive_includes.hash(&mut hasher);
    engine.include_dirs.hash(&mut hasher);
    options.constants.hash(&mut hasher);

    hasher.finish()
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

fn mtime(path: &Path) -> Result<u64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs())
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    /// Bytes of cached output
    pub total_size: u64,
}

impl CacheStats {
    pub fn size_human(&self) -> String {
        const UNITS: [&str; 3] = ["KB", "MB", "GB"];

        if self.total_size < 1024 {
            return format!("{} bytes", self.total_size);
        }
        let mut size = self.total_size as f64 / 1024.0;
        let mut unit = 0;
        while size >= 1024.0 && unit + 1 < UNITS.len() {
            size /= 1024.0;
            unit += 1;
        }
        format!("{:.2} {}", size, UNITS[unit])
    }
}
