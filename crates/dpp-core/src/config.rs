//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// dpp configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine configuration
    pub engine: EngineConfig,

    /// Ambient constants visible to `#if`, `#ifdef` and `#ifndef`
    pub constants: BTreeMap<String, String>,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Batch configuration
    pub batch: BatchConfig,
}

impl Config {
    /// Load configuration, picking the format from the file extension
    pub fn load(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            other => Err(Error::Config(format!(
                "unsupported config format: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = read_config(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = read_config(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

fn read_config(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    Ok(fs::read_to_string(path)?)
}

/// How `#if`-family directives track suppression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionalMode {
    /// One suppress flag for the whole pass; `#endif` always clears it
    #[default]
    Flat,
    /// A stack of conditional frames; `#endif` closes one level
    Nested,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Conditional tracking mode
    pub conditional_mode: ConditionalMode,

    /// Keep `#define`s across calls on the same engine instance
    pub persist_macros: bool,

    /// Extra directories searched for `#include` targets
    pub include_dirs: Vec<PathBuf>,

    /// Preprocess included files instead of inlining them verbatim
    pub recursive_includes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conditional_mode: ConditionalMode::Flat,
            persist_macros: false,
            include_dirs: vec![],
            recursive_includes: false,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the on-disk output cache
    pub enabled: bool,

    /// Cache directory
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
        }
    }
}

/// Batch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// File extensions to process
    pub extensions: Vec<String>,

    /// Glob patterns (relative to the batch root) to skip
    pub exclude: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["php".into()],
            exclude: vec![".git/**".into(), "vendor/**".into()],
        }
    }
}
