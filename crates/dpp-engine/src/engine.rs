//! Directive engine
//!
//! Tokenizes the source, dispatches directive comments to their handlers and
//! accumulates everything else into the output unless it is suppressed.
//!
//! An `Engine` is not meant to be shared between threads while processing;
//! use one engine per thread (see [`crate::parallel`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use dpp_core::{EngineConfig, Error, Result};

use crate::ambient::{AmbientConstants, NoConstants};
use crate::condition::{ConditionalState, Evaluator};
use crate::directive::{parse_directive, strip_delimiters, DirectiveKind};
use crate::macros::MacroTable;
use crate::source::{FsReader, IncludeResolver, SourceReader};
use crate::token::{SourceTokenizer, Tokenizer};

/// The preprocessor
pub struct Engine {
    config: EngineConfig,
    macros: MacroTable,
    state: ConditionalState,
    output: Vec<u8>,
    tokenizer: Box<dyn Tokenizer>,
    constants: Arc<dyn AmbientConstants>,
    reader: Arc<dyn SourceReader>,
    resolver: IncludeResolver,
    /// Files being processed, outermost first
    include_stack: Vec<PathBuf>,
}

impl Engine {
    /// Create an engine with the default configuration
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Create an engine from configuration
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            macros: MacroTable::new(),
            state: ConditionalState::new(config.conditional_mode),
            output: Vec::new(),
            tokenizer: Box::new(SourceTokenizer::new()),
            constants: Arc::new(NoConstants),
            reader: Arc::new(FsReader),
            resolver: IncludeResolver::new(config.include_dirs.clone()),
            include_stack: Vec::new(),
        }
    }

    /// Set the ambient constants
    pub fn with_constants(self, constants: impl AmbientConstants + 'static) -> Self {
        self.with_shared_constants(Arc::new(constants))
    }

    /// Set ambient constants shared with other engines
    pub fn with_shared_constants(mut self, constants: Arc<dyn AmbientConstants>) -> Self {
        self.constants = constants;
        self
    }

    /// Set the source reader
    pub fn with_reader(mut self, reader: impl SourceReader + 'static) -> Self {
        self.reader = Arc::new(reader);
        self
    }

    /// Set the tokenizer
    pub fn with_tokenizer(mut self, tokenizer: impl Tokenizer + 'static) -> Self {
        self.tokenizer = Box::new(tokenizer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Macros defined so far
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// Whether output is currently suppressed
    pub fn is_suppressed(&self) -> bool {
        self.state.is_suppressed()
    }

    /// Preprocess source text.
    ///
    /// Fails with [`Error::InvalidUtf8`] if an `#include` brought in bytes
    /// that are not UTF-8; use [`process_bytes`](Self::process_bytes) for
    /// sources in other encodings.
    pub fn process_string(&mut self, source: &str) -> Result<String> {
        let output = self.process_bytes(source.as_bytes())?;
        String::from_utf8(output).map_err(|_| Error::InvalidUtf8("<string>".to_string()))
    }

    /// Preprocess raw source bytes. Bytes outside directive comments are
    /// copied through unchanged, whatever their encoding.
    pub fn process_bytes(&mut self, source: &[u8]) -> Result<Vec<u8>> {
        self.process_source(None, source)
    }

    /// Read a file and preprocess its contents as text.
    ///
    /// Fails with [`Error::InvalidUtf8`] if the output is not UTF-8; use
    /// [`process_file_bytes`](Self::process_file_bytes) to keep the bytes.
    pub fn process_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let output = self.process_file_bytes(path)?;
        String::from_utf8(output).map_err(|_| Error::InvalidUtf8(path.display().to_string()))
    }

    /// Read a file and preprocess its bytes. Relative `#include`s are
    /// resolved next to it first.
    pub fn process_file_bytes(&mut self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        if !self.reader.exists(path) {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let source = self.reader.read(path)?;
        self.process_source(Some(path), &source)
    }

    /// Preprocess `source` as if it had been read from `origin`, which
    /// anchors relative `#include` lookup
    pub fn process_source(&mut self, origin: Option<&Path>, source: &[u8]) -> Result<Vec<u8>> {
        self.begin_pass();
        if let Some(path) = origin {
            debug!("Processing {:?}", path);
            self.include_stack.push(path.to_path_buf());
        }
        let result = self.run(source).and_then(|_| self.state.finish());
        self.include_stack.clear();
        result?;

        Ok(std::mem::take(&mut self.output))
    }

    fn begin_pass(&mut self) {
        self.output.clear();
        self.state.reset();
        self.include_stack.clear();
        if !self.config.persist_macros {
            self.macros.clear();
        }
    }

    fn run(&mut self, source: &[u8]) -> Result<()> {
        for token in self.tokenizer.tokenize(source) {
            if token.is_directive_candidate() {
                // A comment that is not UTF-8 cannot name a directive
                if let Some(comment) = token.as_str() {
                    if self.handle_directive(comment)? {
                        continue;
                    }
                }
            }
            if self.state.is_suppressed() {
                continue;
            }
            self.output.extend_from_slice(token.text);
        }
        Ok(())
    }

    /// Dispatch a directive comment.
    ///
    /// Returns `true` if the comment was consumed as a directive, `false` if
    /// it is ordinary text (unknown name, or a required payload is missing).
    fn handle_directive(&mut self, comment: &str) -> Result<bool> {
        let Some(directive) = parse_directive(comment) else {
            return Ok(false);
        };
        trace!("Directive {} {:?}", directive.kind, directive.payload);

        let payload = directive.payload;
        match directive.kind {
            DirectiveKind::Define => self.define_directive(payload),
            DirectiveKind::Include => self.include_directive(payload),
            DirectiveKind::If => self.if_directive(payload),
            DirectiveKind::Elif => self.elif_directive(payload),
            DirectiveKind::Ifdef => self.ifdef_directive(payload, true),
            DirectiveKind::Ifndef => self.ifdef_directive(payload, false),
            DirectiveKind::Else => {
                self.state.else_branch()?;
                Ok(true)
            }
            DirectiveKind::Endif => {
                self.state.endif()?;
                Ok(true)
            }
        }
    }

    /// `#define NAME "value"`
    fn define_directive(&mut self, payload: Option<&str>) -> Result<bool> {
        if self.state.is_suppressed() {
            return Ok(true);
        }
        let Some(payload) = payload else {
            return Ok(false);
        };
        let (name, raw_value) = payload.split_once(' ').unwrap_or((payload, ""));
        self.macros.define(name, strip_delimiters(raw_value))?;
        Ok(true)
    }

    /// `#include "path"`
    fn include_directive(&mut self, payload: Option<&str>) -> Result<bool> {
        if self.state.is_suppressed() {
            return Ok(true);
        }
        let Some(payload) = payload else {
            return Ok(false);
        };
        let target = strip_delimiters(payload);
        let from_file = self.include_stack.last().map(PathBuf::as_path);
        let path = self
            .resolver
            .resolve(target, from_file, self.reader.as_ref())
            .ok_or_else(|| Error::IncludeNotFound(target.to_string()))?;
        let contents = self
            .reader
            .read(&path)
            .map_err(|_| Error::IncludeNotFound(path.display().to_string()))?;
        debug!("Including {:?}", path);

        if !self.config.recursive_includes {
            self.output.extend_from_slice(&contents);
            return Ok(true);
        }

        let canonical = self.reader.canonicalize(&path);
        if self
            .include_stack
            .iter()
            .any(|open| self.reader.canonicalize(open) == canonical)
        {
            return Err(Error::IncludeCycle(path.display().to_string()));
        }
        self.include_stack.push(path);
        let result = self.run(&contents);
        self.include_stack.pop();
        result.map(|_| true)
    }

    /// `#if (expr)`
    fn if_directive(&mut self, payload: Option<&str>) -> Result<bool> {
        let Some(expr) = payload else {
            return Ok(false);
        };
        let (macros, constants) = (&self.macros, self.constants.as_ref());
        self.state.enter(|| evaluate(expr, macros, constants));
        Ok(true)
    }

    /// `#elif (expr)`
    fn elif_directive(&mut self, payload: Option<&str>) -> Result<bool> {
        if payload.is_none() && self.state.elif_evaluates() {
            return Ok(false);
        }
        let expr = payload.unwrap_or_default();
        let (macros, constants) = (&self.macros, self.constants.as_ref());
        self.state.elif(|| evaluate(expr, macros, constants))?;
        Ok(true)
    }

    /// `#ifdef NAME` (`expect_defined`) and `#ifndef NAME`
    fn ifdef_directive(&mut self, payload: Option<&str>, expect_defined: bool) -> Result<bool> {
        let Some(name) = payload.map(str::trim) else {
            return Ok(false);
        };
        let (macros, constants) = (&self.macros, self.constants.as_ref());
        self.state
            .enter(|| (macros.contains(name) || constants.is_defined(name)) == expect_defined);
        Ok(true)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate a condition, treating anything unevaluable as false
fn evaluate(expr: &str, macros: &MacroTable, constants: &dyn AmbientConstants) -> bool {
    match Evaluator::new(macros, constants).eval_condition(expr) {
        Some(value) => value,
        None => {
            warn!("Cannot evaluate condition '{}', suppressing", expr.trim());
            false
        }
    }
}
