//! dpp Core
//!
//! Error taxonomy and configuration types shared by the dpp engine and CLI.

pub mod config;
pub mod error;

pub use config::{BatchConfig, CacheConfig, ConditionalMode, Config, EngineConfig};
pub use error::{Error, Result};
