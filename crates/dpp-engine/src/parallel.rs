//! Parallel directory processing using rayon
//!
//! Every file gets its own [`Engine`]; engines never cross threads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dpp_core::{BatchConfig, EngineConfig, Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::ambient::{AmbientConstants, NoConstants};
use crate::engine::Engine;

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Progress event for tracking a batch run
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// Batch phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Scanning,
    Processing,
    Complete,
}

/// Processes a directory tree into an output tree
pub struct BatchProcessor {
    engine: EngineConfig,
    constants: Arc<dyn AmbientConstants>,
    batch: BatchConfig,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl BatchProcessor {
    pub fn new(engine: EngineConfig, batch: BatchConfig) -> Self {
        Self {
            engine,
            constants: Arc::new(NoConstants),
            batch,
            progress_callback: None,
        }
    }

    /// Set the ambient constants every engine sees
    pub fn with_constants(mut self, constants: impl AmbientConstants + 'static) -> Self {
        self.constants = Arc::new(constants);
        self
    }

    /// Set progress callback
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Source files under `dir` selected by the batch configuration, sorted
    pub fn collect_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let exclude = build_globset(&self.batch.exclude)?;

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| self.batch.extensions.iter().any(|want| want == ext))
                    .unwrap_or(false)
            })
            .filter(|e| {
                let relative = e.path().strip_prefix(dir).unwrap_or(e.path());
                !exclude.is_match(relative)
            })
            .map(|e| e.path().to_path_buf())
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Process every selected file under `src_dir`, writing the output to the
    /// same relative path under `out_dir`
    pub fn process_directory(
        &self,
        src_dir: &Path,
        out_dir: &Path,
    ) -> Result<Vec<(PathBuf, Result<PathBuf>)>> {
        self.emit_progress(ProgressPhase::Scanning, 0, 0, "Scanning directory...");
        let paths = self.collect_files(src_dir)?;

        info!("Found {} files to process", paths.len());
        self.emit_progress(
            ProgressPhase::Scanning,
            paths.len(),
            paths.len(),
            format!("Found {} files", paths.len()),
        );

        let total = paths.len();
        let processed = AtomicUsize::new(0);

        let results: Vec<_> = paths
            .par_iter()
            .map(|path| {
                let result = self.process_one(path, src_dir, out_dir);

                let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                if current % 10 == 0 || current == total {
                    self.emit_progress(
                        ProgressPhase::Processing,
                        current,
                        total,
                        format!("Processed {}/{} files", current, total),
                    );
                }

                (path.clone(), result)
            })
            .collect();

        self.emit_progress(ProgressPhase::Complete, total, total, "Processing complete");
        Ok(results)
    }

    fn process_one(&self, path: &Path, src_dir: &Path, out_dir: &Path) -> Result<PathBuf> {
        let relative = path.strip_prefix(src_dir).unwrap_or(path);
        let target = out_dir.join(relative);

        let mut engine =
            Engine::with_config(&self.engine).with_shared_constants(Arc::clone(&self.constants));
        let output = engine.process_file_bytes(path)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, output)?;
        debug!("Wrote {:?}", target);

        Ok(target)
    }

    fn emit_progress<S: Into<String>>(
        &self,
        phase: ProgressPhase,
        current: usize,
        total: usize,
        message: S,
    ) {
        if let Some(ref callback) = self.progress_callback {
            callback(ProgressEvent {
                phase,
                current,
                total,
                message: message.into(),
            });
        }
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(EngineConfig::default(), BatchConfig::default())
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| Error::Config(e.to_string()))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| Error::Config(e.to_string()))
}
