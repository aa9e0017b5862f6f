//! Expression evaluator for `#if` and `#elif`
//!
//! Supports C-style integer expressions (arithmetic, bitwise, comparison,
//! logical operators), string literals, `defined(NAME)`, and identifiers
//! resolved against the macro table and the ambient constants.
//!
//! Anything that cannot be evaluated yields [`EvalResult::Unknown`]; callers
//! treat that as false.

use crate::ambient::AmbientConstants;
use crate::macros::MacroTable;
use std::cmp::Ordering;

/// Binary operators, loosest binding first
const BINARY_LEVELS: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["|"],
    &["^"],
    &["&"],
    &["==", "!="],
    &["<=", ">=", "<", ">"],
    &["<<", ">>"],
    &["+", "-"],
    &["*", "/", "%"],
];

/// Deepest nesting (parentheses, unary and binary operators) evaluated
/// before giving up
const MAX_DEPTH: usize = 256;

/// Characters after which `+` or `-` is a sign, not a binary operator
const OPERATOR_CHARS: &str = "+-*/%&|^!<>=(~";

/// Evaluation result
#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    Integer(i64),
    Bool(bool),
    String(String),
    Unknown,
}

impl EvalResult {
    /// Build a result from a macro or constant value
    fn from_value(value: &str) -> Self {
        match parse_integer(value.trim()) {
            Some(n) => EvalResult::Integer(n),
            None => EvalResult::String(value.to_string()),
        }
    }

    pub fn is_truthy(&self) -> Option<bool> {
        match self {
            EvalResult::Integer(n) => Some(*n != 0),
            EvalResult::Bool(b) => Some(*b),
            EvalResult::String(s) => Some(!s.is_empty() && s != "0"),
            EvalResult::Unknown => None,
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            EvalResult::Integer(n) => Some(*n),
            EvalResult::Bool(b) => Some(i64::from(*b)),
            EvalResult::String(s) => parse_integer(s.trim()),
            EvalResult::Unknown => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            EvalResult::Integer(n) => Some(n.to_string()),
            EvalResult::String(s) => Some(s.clone()),
            EvalResult::Bool(_) | EvalResult::Unknown => None,
        }
    }
}

/// Expression evaluator bound to the macro table and ambient constants
pub struct Evaluator<'a> {
    macros: &'a MacroTable,
    constants: &'a dyn AmbientConstants,
}

impl<'a> Evaluator<'a> {
    pub fn new(macros: &'a MacroTable, constants: &'a dyn AmbientConstants) -> Self {
        Self { macros, constants }
    }

    /// Evaluate an expression string
    pub fn eval(&self, expr: &str) -> EvalResult {
        self.eval_expr(expr, 0)
    }

    /// Evaluate a condition; `None` means it could not be evaluated
    pub fn eval_condition(&self, condition: &str) -> Option<bool> {
        self.eval(condition).is_truthy()
    }

    fn eval_expr(&self, expr: &str, depth: usize) -> EvalResult {
        let expr = expr.trim();
        if expr.is_empty() || depth > MAX_DEPTH {
            return EvalResult::Unknown;
        }
        let depth = depth + 1;

        if let Some(inner) = extract_parens(expr) {
            return self.eval_expr(inner, depth);
        }

        for ops in BINARY_LEVELS {
            if let Some((left, op, right)) = split_binary(expr, ops) {
                let left = self.eval_expr(left, depth);
                let right = self.eval_expr(right, depth);
                return apply_binary(op, left, right);
            }
        }

        if let Some(rest) = expr.strip_prefix('!') {
            return match self.eval_expr(rest, depth).is_truthy() {
                Some(b) => EvalResult::Bool(!b),
                None => EvalResult::Unknown,
            };
        }
        if let Some(rest) = expr.strip_prefix('~') {
            return match self.eval_expr(rest, depth).to_i64() {
                Some(n) => EvalResult::Integer(!n),
                None => EvalResult::Unknown,
            };
        }
        if let Some(rest) = expr.strip_prefix('-') {
            return match self.eval_expr(rest, depth).to_i64().and_then(i64::checked_neg) {
                Some(n) => EvalResult::Integer(n),
                None => EvalResult::Unknown,
            };
        }

        self.eval_atom(expr)
    }

    fn eval_atom(&self, expr: &str) -> EvalResult {
        if expr.eq_ignore_ascii_case("true") {
            return EvalResult::Bool(true);
        }
        if expr.eq_ignore_ascii_case("false") {
            return EvalResult::Bool(false);
        }

        if let Some(name) = defined_operand(expr) {
            return EvalResult::Bool(self.is_defined(name));
        }

        if let Some(n) = parse_integer(expr) {
            return EvalResult::Integer(n);
        }

        if let Some(literal) = string_literal(expr) {
            return EvalResult::String(literal.to_string());
        }

        if is_identifier(expr) {
            if let Some(value) = self.macros.get(expr) {
                return EvalResult::from_value(value);
            }
            if let Some(value) = self.constants.value(expr) {
                return EvalResult::from_value(&value);
            }
        }

        EvalResult::Unknown
    }

    fn is_defined(&self, name: &str) -> bool {
        self.macros.contains(name) || self.constants.is_defined(name)
    }
}

fn apply_binary(op: &str, a: EvalResult, b: EvalResult) -> EvalResult {
    match op {
        "||" => match (a.is_truthy(), b.is_truthy()) {
            (Some(true), _) | (_, Some(true)) => EvalResult::Bool(true),
            (Some(false), Some(false)) => EvalResult::Bool(false),
            _ => EvalResult::Unknown,
        },
        "&&" => match (a.is_truthy(), b.is_truthy()) {
            (Some(false), _) | (_, Some(false)) => EvalResult::Bool(false),
            (Some(true), Some(true)) => EvalResult::Bool(true),
            _ => EvalResult::Unknown,
        },
        "==" | "!=" | "<" | ">" | "<=" | ">=" => compare_values(op, &a, &b),
        _ => {
            let (Some(x), Some(y)) = (a.to_i64(), b.to_i64()) else {
                return EvalResult::Unknown;
            };
            let value = match op {
                "|" => Some(x | y),
                "^" => Some(x ^ y),
                "&" => Some(x & y),
                "<<" => u32::try_from(y).ok().and_then(|s| x.checked_shl(s)),
                ">>" => u32::try_from(y).ok().and_then(|s| x.checked_shr(s)),
                "+" => x.checked_add(y),
                "-" => x.checked_sub(y),
                "*" => x.checked_mul(y),
                "/" => x.checked_div(y),
                "%" => x.checked_rem(y),
                _ => None,
            };
            value.map(EvalResult::Integer).unwrap_or(EvalResult::Unknown)
        }
    }
}

fn compare_values(op: &str, a: &EvalResult, b: &EvalResult) -> EvalResult {
    let ordering = match (a.to_i64(), b.to_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => match (a.as_text(), b.as_text()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => return EvalResult::Unknown,
        },
    };
    let result = match op {
        "==" => ordering == Ordering::Equal,
        "!=" => ordering != Ordering::Equal,
        "<" => ordering == Ordering::Less,
        ">" => ordering == Ordering::Greater,
        "<=" => ordering != Ordering::Greater,
        ">=" => ordering != Ordering::Less,
        _ => return EvalResult::Unknown,
    };
    EvalResult::Bool(result)
}

/// Find the rightmost operator of one precedence level outside parentheses
/// and quotes, so operators of equal precedence associate to the left.
fn split_binary<'e>(expr: &'e str, ops: &[&'static str]) -> Option<(&'e str, &'static str, &'e str)> {
    let bytes = expr.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;

    for i in (0..bytes.len()).rev() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            b'"' | b'\'' => quote = Some(c),
            b')' => depth += 1,
            b'(' => depth -= 1,
            _ if depth == 0 => {
                for op in ops {
                    if !bytes[i..].starts_with(op.as_bytes()) || !is_standalone(bytes, i, op) {
                        continue;
                    }
                    let left = &expr[..i];
                    let right = &expr[i + op.len()..];
                    if left.trim().is_empty() || right.trim().is_empty() {
                        continue;
                    }
                    if (*op == "+" || *op == "-") && !is_binary_position(left) {
                        continue;
                    }
                    return Some((left, op, right));
                }
            }
            _ => {}
        }
    }
    None
}

/// Reject matches that are really part of a longer operator
fn is_standalone(bytes: &[u8], i: usize, op: &str) -> bool {
    let prev = i.checked_sub(1).map(|p| bytes[p]);
    let next = bytes.get(i + op.len()).copied();
    match op {
        "|" => prev != Some(b'|') && next != Some(b'|'),
        "&" => prev != Some(b'&') && next != Some(b'&'),
        "<" => prev != Some(b'<') && !matches!(next, Some(b'<') | Some(b'=')),
        ">" => prev != Some(b'>') && !matches!(next, Some(b'>') | Some(b'=')),
        "<<" => prev != Some(b'<') && next != Some(b'<'),
        ">>" => prev != Some(b'>') && next != Some(b'>'),
        "<=" => prev != Some(b'<'),
        ">=" => prev != Some(b'>'),
        "==" => !matches!(prev, Some(b'=') | Some(b'!') | Some(b'<') | Some(b'>')) && next != Some(b'='),
        "!=" => next != Some(b'='),
        _ => true,
    }
}

fn is_binary_position(left: &str) -> bool {
    left.trim_end()
        .chars()
        .last()
        .map(|c| !OPERATOR_CHARS.contains(c))
        .unwrap_or(false)
}

/// Inner text of an expression wrapped in one balanced pair of parentheses
fn extract_parens(expr: &str) -> Option<&str> {
    if !expr.starts_with('(') || !expr.ends_with(')') {
        return None;
    }
    let mut depth = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i < expr.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(&expr[1..expr.len() - 1])
}

/// `defined(NAME)` or `defined NAME`
fn defined_operand(expr: &str) -> Option<&str> {
    let rest = expr.strip_prefix("defined")?;
    let name = match rest.trim_start().strip_prefix('(') {
        Some(inner) => inner.strip_suffix(')')?.trim(),
        None if rest.starts_with(char::is_whitespace) => rest.trim(),
        None => return None,
    };
    is_identifier(name).then_some(name)
}

fn string_literal(expr: &str) -> Option<&str> {
    let quote = expr.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    if expr.len() >= 2 && expr.ends_with(quote) {
        Some(&expr[1..expr.len() - 1])
    } else {
        None
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).ok();
    }
    text.parse::<i64>().ok()
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
