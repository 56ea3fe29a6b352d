//! Source positions and compiler diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A location in MPD source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Byte offset from the start of the source.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

impl Position {
    /// Position of the first character of a source.
    pub fn start() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open source range covered by a token or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// First position covered.
    pub start: Position,
    /// Position just past the covered text.
    pub end: Position,
}

impl Span {
    /// Construct a span from two positions.
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Span starting where `self` starts and ending where `other` ends.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
        }
    }

    /// Zero-width span at `pos`.
    pub fn point(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The document is broken at this location.
    Error,
    /// Suspicious but accepted.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Stable diagnostic codes, `phase/kind`.
pub mod codes {
    /// Character that starts no token.
    pub const UNEXPECTED_CHARACTER: &str = "lex/unexpected-character";
    /// String literal without closing quote.
    pub const UNTERMINATED_STRING: &str = "lex/unterminated-string";
    /// Token that does not fit the grammar at this point.
    pub const UNEXPECTED_TOKEN: &str = "parse/unexpected-token";
    /// Input ended while a construct was still open.
    pub const UNEXPECTED_EOF: &str = "parse/unexpected-eof";
    /// Value outside a fixed enumeration.
    pub const INVALID_VALUE: &str = "parse/invalid-value";
    /// Navigation toggle that is not recognised.
    pub const UNKNOWN_TOGGLE: &str = "parse/unknown-toggle";
    /// Declared version differs from the supported one.
    pub const VERSION_MISMATCH: &str = "validate/version-mismatch";
    /// Step name repeated inside one scene.
    pub const DUPLICATE_STEP: &str = "validate/duplicate-step";
    /// Block kept verbatim because it is not understood.
    pub const UNKNOWN_BLOCK: &str = "validate/unknown-block";
    /// Edge endpoint given as `*`.
    pub const EDGE_WILDCARD: &str = "validate/edge-wildcard";
    /// `css`/`id`/`text` target with an empty string.
    pub const EMPTY_TARGET: &str = "validate/empty-target";
    /// `except` with wildcards on both sides.
    pub const WILDCARD_EXCEPT: &str = "validate/wildcard-except";
    /// Binding `when` clause that the document model cannot carry.
    pub const UNSUPPORTED_WHEN: &str = "normalize/unsupported-when";
    /// `$name` with no matching `let`.
    pub const UNRESOLVED_VARIABLE: &str = "normalize/unresolved-variable";
    /// Step `errorPolicy` that is neither `haltOnError` nor `continueOnError`.
    pub const INVALID_ERROR_POLICY: &str = "normalize/invalid-error-policy";
}

/// A message produced by the lexer, parser, validator or normalizer.
///
/// Diagnostics are collected, never thrown; callers inspect
/// [`has_errors`] to decide whether a document is usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Human readable description.
    pub message: String,
    /// Error or warning.
    pub severity: Severity,
    /// Source range, when one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    /// Stable identifier from [`codes`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Diagnostic {
    /// Error diagnostic with a code and span.
    pub fn error(code: &str, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
            span: Some(span),
            code: Some(code.to_string()),
        }
    }

    /// Warning diagnostic with a code and span.
    pub fn warning(code: &str, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
            span: Some(span),
            code: Some(code.to_string()),
        }
    }

    /// Whether this diagnostic has error severity.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{}: {}: {}", span.start, self.severity, self.message)?,
            None => write!(f, "{}: {}", self.severity, self.message)?,
        }
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        Ok(())
    }
}

/// True when any diagnostic in the slice is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
