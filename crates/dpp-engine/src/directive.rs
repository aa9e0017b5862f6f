//! Directive parsing
//!
//! Turns the text of a directive-candidate comment into a [`Directive`]:
//! a known directive kind plus its raw payload.

use std::fmt;
use std::str::FromStr;

/// Directives the engine knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Define,
    Include,
    If,
    Elif,
    Ifdef,
    Ifndef,
    Else,
    Endif,
}

impl DirectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::Define => "define",
            DirectiveKind::Include => "include",
            DirectiveKind::If => "if",
            DirectiveKind::Elif => "elif",
            DirectiveKind::Ifdef => "ifdef",
            DirectiveKind::Ifndef => "ifndef",
            DirectiveKind::Else => "else",
            DirectiveKind::Endif => "endif",
        }
    }
}

impl FromStr for DirectiveKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "define" => Ok(DirectiveKind::Define),
            "include" => Ok(DirectiveKind::Include),
            "if" => Ok(DirectiveKind::If),
            "elif" => Ok(DirectiveKind::Elif),
            "ifdef" => Ok(DirectiveKind::Ifdef),
            "ifndef" => Ok(DirectiveKind::Ifndef),
            "else" => Ok(DirectiveKind::Else),
            "endif" => Ok(DirectiveKind::Endif),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

/// A parsed directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive<'a> {
    pub kind: DirectiveKind,
    /// Everything after the first space, untouched (quotes included)
    pub payload: Option<&'a str>,
}

/// Parse the text of a `#...` comment.
///
/// Returns `None` when the name is not a known directive; such comments are
/// ordinary text.
pub fn parse_directive(comment: &str) -> Option<Directive<'_>> {
    let candidate = comment.trim().strip_prefix('#')?;
    let (name, payload) = match candidate.split_once(' ') {
        Some((name, rest)) => (name, Some(rest)),
        None => (candidate, None),
    };
    let kind = name.parse().ok()?;
    Some(Directive { kind, payload })
}

/// Drop exactly one leading and one trailing character (the quotes around
/// `"value"` or `"file.txt"`). The characters are not validated.
pub fn strip_delimiters(raw: &str) -> &str {
    let mut chars = raw.chars();
    if chars.next().is_none() || chars.next_back().is_none() {
        return "";
    }
    chars.as_str()
}
