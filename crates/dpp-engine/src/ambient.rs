//! Ambient constants
//!
//! Names defined by the host environment rather than by `#define`. They are
//! consulted by `#ifdef`, `#ifndef` and identifier lookups in `#if`.

use dpp_core::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// `NAME` or `NAME=VALUE`
fn definition_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:=(.*))?$"))
        .as_ref()
        .map_err(|e| Error::Config(e.to_string()))
}

/// Lookup of constants defined outside the engine's macro table
pub trait AmbientConstants: Send + Sync {
    /// Value of `name`, if defined
    fn value(&self, name: &str) -> Option<String>;

    /// Whether `name` is defined
    fn is_defined(&self, name: &str) -> bool {
        self.value(name).is_some()
    }
}

/// An environment with no constants
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConstants;

impl AmbientConstants for NoConstants {
    fn value(&self, _name: &str) -> Option<String> {
        None
    }
}

/// In-memory constant table (config file, `-D` flags, tests)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConstantTable {
    constants: BTreeMap<String, String>,
}

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or overwrite) a constant
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.constants.insert(name.into(), value.into());
    }

    /// Parse a `NAME` or `NAME=VALUE` definition. A bare name is defined as `1`.
    pub fn parse_definition(definition: &str) -> Result<(String, String)> {
        let caps = definition_pattern()?
            .captures(definition.trim())
            .ok_or_else(|| Error::Config(format!("invalid constant definition: {}", definition)))?;
        let name = caps[1].to_string();
        let value = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_else(|| "1".to_string());
        Ok((name, value))
    }

    /// Build a table from `NAME[=VALUE]` definitions
    pub fn from_definitions<'a>(definitions: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut table = Self::new();
        for definition in definitions {
            let (name, value) = Self::parse_definition(definition)?;
            table.define(name, value);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.constants.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge another table into this one; entries in `other` win
    pub fn extend(&mut self, other: ConstantTable) {
        self.constants.extend(other.constants);
    }
}

impl From<BTreeMap<String, String>> for ConstantTable {
    fn from(constants: BTreeMap<String, String>) -> Self {
        Self { constants }
    }
}

impl AmbientConstants for ConstantTable {
    fn value(&self, name: &str) -> Option<String> {
        self.constants.get(name).cloned()
    }
}

/// Process environment variables, optionally under a prefix
/// (`DPP_` + `DEBUG` for `#ifdef DEBUG`)
#[derive(Debug, Clone, Default)]
pub struct EnvConstants {
    prefix: String,
}

impl EnvConstants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl AmbientConstants for EnvConstants {
    fn value(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}{}", self.prefix, name)).ok()
    }
}
