//! Tokens of the WHERE-clause grammar.

use std::borrow::Cow;

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords
    And,
    Or,
    Not,
    In,
    Is,
    Null,
    Between,
    Like,
    ILike,
    True,
    False,

    // Identifiers and literals
    Identifier(&'a str),
    /// `"x"`, `` `x` `` or `[x]`, with the quoting removed
    QuotedIdentifier(Cow<'a, str>),
    /// String literal content with escapes resolved
    String(Cow<'a, str>),
    /// Numeric literal text, sign excluded
    Number(&'a str),

    // Punctuation
    LParen,
    RParen,
    Comma,
    Dot,

    // Operators
    Eq,    // =
    NotEq, // != or <>
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=
    Minus, // -

    /// `-- ...` up to the end of the line, or `/* ... */`
    Comment,

    /// An unknown character or an unterminated literal
    Illegal,
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}
