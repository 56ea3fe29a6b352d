//! Token model shared by the lexer and parser.

use serde::{Deserialize, Serialize};

use super::diagnostic::{Position, Span};

/// Reserved words of the MPD grammar.
pub const KEYWORDS: &[&str] = &[
    "mpd", "deck", "meta", "let", "use", "diagram", "mermaid", "config", "assets", "runtime",
    "camera", "overlay", "navigation", "performance", "selectors", "styles", "scene", "step", "as",
    "focus", "pad", "align", "lock", "id", "do", "assert", "else", "binding", "priority", "on",
    "target", "when", "node", "edge", "subgraph", "css", "text", "group", "union", "intersect",
    "except", "or", "and",
];

/// Keywords that open a target expression.
pub const TARGET_KEYWORDS: &[&str] = &[
    "node", "edge", "subgraph", "css", "id", "text", "group", "union", "intersect", "except",
];

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Reserved word.
    Keyword,
    /// Bare word (hyphens allowed).
    Identifier,
    /// Quoted string.
    String,
    /// Decimal number.
    Number,
    /// Integer.
    Int,
    /// Number with `ms`, `s` or `m` suffix.
    Duration,
    /// Number with `%` suffix.
    Percent,
    /// `true` / `false`.
    Boolean,
    /// `null`.
    Null,
    /// `#rgb` / `#rrggbb`.
    Color,
    /// Arithmetic, comparison or logical operator.
    Operator,
    /// Single-character punctuation.
    Punct,
    /// `<<<TAG ... TAG>>>` raw block.
    Heredoc,
    /// End of input.
    Eof,
}

/// Parsed payload of a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenValue {
    /// Words, operators, punctuation, strings and colors.
    Text(String),
    /// Decimal, integer or percent magnitude.
    Number(f64),
    /// Duration in milliseconds.
    Millis(f64),
    /// Boolean literal.
    Bool(bool),
    /// `null` or end of input.
    None,
    /// Raw heredoc block.
    Heredoc {
        /// Delimiter tag.
        tag: String,
        /// Verbatim body between the delimiter lines.
        body: String,
    },
}

/// A token with its source image and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Classification.
    pub kind: TokenKind,
    /// Parsed value.
    pub value: TokenValue,
    /// Exact source text.
    pub image: String,
    /// First position.
    pub start: Position,
    /// Position after the last character.
    pub end: Position,
}

impl Token {
    /// Source span of the token.
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    /// Text payload for word-like tokens (and strings, after unescaping).
    pub fn text(&self) -> &str {
        match &self.value {
            TokenValue::Text(text) => text,
            _ => &self.image,
        }
    }

    /// Whether this is the given keyword.
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.image == word
    }

    /// Whether this is the given punctuation character.
    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.image == punct
    }

    /// Whether this is the given operator.
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.image == op
    }

    /// Keywords and identifiers both spell a word.
    pub fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Keyword | TokenKind::Identifier)
    }

    /// End-of-input sentinel.
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// Whether `word` is reserved.
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Whether `word` opens a target expression.
pub fn is_target_keyword(word: &str) -> bool {
    TARGET_KEYWORDS.contains(&word)
}
