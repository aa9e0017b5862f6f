//! On-demand loading
//!
//! [`CachedLoader`] hands out the processed form of a source file, building
//! it on first use and serving it from a [`PreprocessCache`] afterwards.

mod cache;

pub use cache::{CacheStats, PreprocessCache, SourceSnapshot};

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use dpp_core::{EngineConfig, Error, Result};

use crate::ambient::ConstantTable;
use crate::engine::Engine;

/// Everything besides the source file that determines the output
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub engine: EngineConfig,
    pub constants: ConstantTable,
}

/// Loads processed sources, through an output cache when one is attached
pub struct CachedLoader {
    options: LoadOptions,
    cache: Option<Mutex<PreprocessCache>>,
}

impl CachedLoader {
    pub fn new(options: LoadOptions, cache: PreprocessCache) -> Self {
        Self {
            options,
            cache: Some(Mutex::new(cache)),
        }
    }

    /// A loader that processes on every call
    pub fn uncached(options: LoadOptions) -> Self {
        Self {
            options,
            cache: None,
        }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Processed contents of `path` as text
    pub fn load(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let output = self.load_bytes(path)?;
        String::from_utf8(output).map_err(|_| Error::InvalidUtf8(path.display().to_string()))
    }

    /// Processed contents of `path`.
    ///
    /// Holds the cache lock across the build, so concurrent loads of the same
    /// file build it once. The source is read once, and the cache entry is
    /// fingerprinted from exactly those bytes.
    pub fn load_bytes(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::NotFound(path.display().to_string()));
        }

        let Some(cache) = &self.cache else {
            return self.build(path, &SourceSnapshot::read(path)?);
        };
        let mut cache = lock(cache)?;

        if let Some(output) = cache.get(path, &self.options) {
            debug!("Cache hit for {:?}", path);
            return Ok(output);
        }

        let snapshot = SourceSnapshot::read(path)?;
        let output = self.build(path, &snapshot)?;
        cache.put(path, &self.options, &snapshot, &output)?;
        info!("Built {:?} ({} bytes)", path, output.len());

        Ok(output)
    }

    /// Drop the cached output for `path`
    pub fn invalidate(&self, path: impl AsRef<Path>) -> Result<()> {
        match &self.cache {
            Some(cache) => lock(cache)?.invalidate(path.as_ref()),
            None => Ok(()),
        }
    }

    /// Statistics of the attached cache, if any
    pub fn stats(&self) -> Result<Option<CacheStats>> {
        match &self.cache {
            Some(cache) => Ok(Some(lock(cache)?.stats())),
            None => Ok(None),
        }
    }

    fn build(&self, path: &Path, snapshot: &SourceSnapshot) -> Result<Vec<u8>> {
        Engine::with_config(&self.options.engine)
            .with_constants(self.options.constants.clone())
            .process_source(Some(path), snapshot.bytes())
    }
}

fn lock(cache: &Mutex<PreprocessCache>) -> Result<MutexGuard<'_, PreprocessCache>> {
    cache
        .lock()
        .map_err(|_| Error::Cache("cache lock poisoned".to_string()))
}
