//! Source tokenizer
//!
//! Splits source bytes into lossless tokens: concatenating the bytes of every
//! token reproduces the input exactly, whatever its encoding. Only comment
//! tokens are inspected for directives; everything else is passed through by
//! the engine untouched.

/// Lexical category of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `# ...`, `// ...` or `/* ... */`
    Comment,
    /// A quoted literal, heredoc or nowdoc (may span lines)
    StringLiteral,
    /// A run of whitespace
    Whitespace,
    /// Anything else
    Text,
}

/// A slice of source bytes with its lexical category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a [u8],
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, text: &'a [u8]) -> Self {
        Self { kind, text }
    }

    /// The token text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.text).ok()
    }

    /// Whether this token may carry a directive (a comment starting with `#`)
    pub fn is_directive_candidate(&self) -> bool {
        self.kind == TokenKind::Comment && self.text.first() == Some(&b'#')
    }
}

/// Tokenizer backend used by the engine
pub trait Tokenizer: Send + Sync {
    /// Split source bytes into tokens
    fn tokenize<'a>(&self, source: &'a [u8]) -> Vec<Token<'a>>;

    /// Get tokenizer name
    fn name(&self) -> &str;
}

/// Default tokenizer for `#`/`//`/`/* */`-commented scripting languages
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceTokenizer;

impl SourceTokenizer {
    pub fn new() -> Self {
        Self
    }

    /// Lazily iterate over the tokens of `source`
    pub fn tokens<'a>(&self, source: &'a [u8]) -> Tokens<'a> {
        Tokens { source, pos: 0 }
    }
}

impl Tokenizer for SourceTokenizer {
    fn tokenize<'a>(&self, source: &'a [u8]) -> Vec<Token<'a>> {
        self.tokens(source).collect()
    }

    fn name(&self) -> &str {
        "source"
    }
}

/// Iterator over the tokens of a source buffer
pub struct Tokens<'a> {
    source: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let bytes = self.source;
        let start = self.pos;
        if start >= bytes.len() {
            return None;
        }

        // Boundaries only fall on ASCII bytes, so a UTF-8 sequence is never
        // split between tokens.
        let (kind, end) = match bytes[start] {
            b'#' => (TokenKind::Comment, line_comment_end(bytes, start)),
            b'/' if bytes.get(start + 1) == Some(&b'/') => {
                (TokenKind::Comment, line_comment_end(bytes, start))
            }
            b'/' if bytes.get(start + 1) == Some(&b'*') => {
                (TokenKind::Comment, block_comment_end(bytes, start))
            }
            b'"' | b'\'' => match string_end(bytes, start) {
                Some(end) => (TokenKind::StringLiteral, end),
                None => (TokenKind::Text, text_end(bytes, start + 1)),
            },
            b'<' => match heredoc_end(bytes, start) {
                Some(end) => (TokenKind::StringLiteral, end),
                None => (TokenKind::Text, text_end(bytes, start + 1)),
            },
            b if b.is_ascii_whitespace() => (TokenKind::Whitespace, whitespace_end(bytes, start)),
            _ => (TokenKind::Text, text_end(bytes, start)),
        };

        self.pos = end;
        Some(Token::new(kind, &bytes[start..end]))
    }
}

/// End of a line comment; the newline (and a preceding `\r`) is not part of it
fn line_comment_end(bytes: &[u8], start: usize) -> usize {
    let mut end = bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|offset| start + offset)
        .unwrap_or(bytes.len());
    if end > start + 1 && bytes[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

/// End of a block comment; an unterminated comment runs to end of input
fn block_comment_end(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map(|offset| start + 2 + offset + 2)
        .unwrap_or(bytes.len())
}

/// End of a quoted literal, or `None` if the quote is never closed
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// End of a `<<<ID` heredoc or `<<<'ID'` nowdoc, or `None` if `start` does
/// not open one or its closing identifier is missing
fn heredoc_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 3;
    if bytes.get(start..i)? != b"<<<" {
        return None;
    }
    while matches!(bytes.get(i), Some(b' ') | Some(b'\t')) {
        i += 1;
    }
    let quote = match bytes.get(i) {
        Some(&q @ (b'"' | b'\'')) => {
            i += 1;
            Some(q)
        }
        _ => None,
    };

    let label_start = i;
    while bytes.get(i).map_or(false, |&b| is_label_byte(b)) {
        i += 1;
    }
    let label = &bytes[label_start..i];
    if label.is_empty() || label[0].is_ascii_digit() {
        return None;
    }
    if let Some(q) = quote {
        if bytes.get(i) != Some(&q) {
            return None;
        }
        i += 1;
    }
    if bytes.get(i) == Some(&b'\r') {
        i += 1;
    }
    if bytes.get(i) != Some(&b'\n') {
        return None;
    }

    // The closing label starts a line (after optional indentation) and is
    // not followed by another label character.
    let mut line = i + 1;
    while line < bytes.len() {
        let mut j = line;
        while matches!(bytes.get(j), Some(b' ') | Some(b'\t')) {
            j += 1;
        }
        let end = j + label.len();
        if bytes.get(j..end) == Some(label) && !bytes.get(end).map_or(false, |&b| is_label_byte(b)) {
            return Some(end);
        }
        line = bytes[line..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|offset| line + offset + 1)
            .unwrap_or(bytes.len());
    }
    None
}

fn is_label_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn whitespace_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|offset| start + offset)
        .unwrap_or(bytes.len())
}

fn text_end(bytes: &[u8], from: usize) -> usize {
    (from..bytes.len())
        .find(|&i| starts_token(bytes, i))
        .unwrap_or(bytes.len())
}

fn starts_token(bytes: &[u8], i: usize) -> bool {
    match bytes[i] {
        b'#' | b'"' | b'\'' => true,
        b'/' => matches!(bytes.get(i + 1), Some(b'/') | Some(b'*')),
        b'<' => bytes[i..].starts_with(b"<<<"),
        b => b.is_ascii_whitespace(),
    }
}
