//! MPD compiler front end
//!
//! Source text flows through the lexer, parser, validator and normalizer.
//! No stage ever fails outright: each returns what it could build together
//! with [`Diagnostic`]s, and callers decide what to do with errors.

/// Abstract syntax tree
pub mod ast;
/// Positions, spans and diagnostics
pub mod diagnostic;
/// Tokenizer
pub mod lexer;
/// AST to presentation document lowering
pub mod normalize;
/// Recursive-descent parser
pub mod parser;
/// AST back to canonical MPD source
pub mod printer;
/// Token model
pub mod token;
/// Semantic checks
pub mod validate;

pub use ast::Program;
pub use diagnostic::{Diagnostic, Position, Severity, Span, has_errors};
pub use lexer::{LexOutput, lex};
pub use normalize::{Normalized, normalize};
pub use parser::{ParseOutput, parse};
pub use printer::print;
pub use validate::validate;

use crate::runtime::document::PresentationDocument;

/// Everything the front end produced for one source text.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// Best-effort AST; `None` only when the `mpd` header is missing.
    pub ast: Option<Program>,
    /// Lowered document, present whenever an AST is.
    pub document: Option<PresentationDocument>,
    /// Lexer, parser, validator and normalizer diagnostics, in that order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    /// Whether any stage reported an error.
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

/// Run every front-end stage over `source`.
pub fn compile(source: &str) -> Compilation {
    let ParseOutput {
        ast,
        mut diagnostics,
    } = parse(source);
    let document = ast.as_ref().map(|program| {
        diagnostics.extend(validate(program));
        let normalized = normalize(program);
        diagnostics.extend(normalized.diagnostics);
        normalized.document
    });
    tracing::debug!(
        diagnostics = diagnostics.len(),
        steps = document.as_ref().map_or(0, |d| d.steps.len()),
        "compiled MPD source"
    );
    Compilation {
        ast,
        document,
        diagnostics,
    }
}
