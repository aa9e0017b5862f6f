//! dpp Engine
//!
//! A conditional-compilation preprocessor driven by directive comments
//! (`#define`, `#include`, `#if`/`#elif`/`#else`/`#endif`, `#ifdef`/`#ifndef`).
//!
//! ## Modules
//!
//! - `token` - Source tokenizer and directive-candidate classification
//! - `directive` - Directive name/payload parsing
//! - `macros` - Table of `#define`d names
//! - `condition` - Suppression state and `#if` expression evaluation
//! - `ambient` - Constants supplied by the host environment
//! - `source` - Byte-source capability and `#include` resolution
//! - `engine` - Directive dispatch and the `process_string`/`process_file` facade
//! - `loader` - On-demand loading through an on-disk output cache
//! - `parallel` - Parallel directory processing using rayon

pub mod ambient;
pub mod condition;
pub mod directive;
pub mod engine;
pub mod loader;
pub mod macros;
pub mod parallel;
pub mod source;
pub mod token;

pub use ambient::{AmbientConstants, ConstantTable, EnvConstants, NoConstants};
pub use condition::ConditionalState;
pub use directive::{Directive, DirectiveKind};
pub use engine::Engine;
pub use loader::{CachedLoader, LoadOptions, PreprocessCache};
pub use macros::MacroTable;
pub use parallel::BatchProcessor;
pub use source::{FsReader, IncludeResolver, MemoryReader, SourceReader};
pub use token::{SourceTokenizer, Token, TokenKind, Tokenizer};

pub use dpp_core::{Error, Result};

#[cfg(test)]
mod tests;
