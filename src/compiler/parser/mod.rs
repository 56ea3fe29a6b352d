//! Recursive-descent parser for MPD.
//!
//! The parser never fails outright. Every helper that cannot match records a
//! diagnostic and substitutes a placeholder so sibling constructs still
//! parse; block loops skip one token whenever an iteration makes no
//! progress, which guarantees termination on arbitrary input.

mod expr;

use super::ast::*;
use super::diagnostic::{Diagnostic, Position, Span, codes};
use super::lexer::{LexOutput, lex};
use super::token::{Token, TokenKind, TokenValue};

/// Values accepted by `runtime { camera { bounds: ... } }`.
pub const CAMERA_BOUNDS: &[&str] = &["none", "diagram", "content", "viewport"];

/// Toggles accepted inside `runtime { navigation { ... } }`.
pub const NAVIGATION_TOGGLES: &[&str] = &["keyboard", "click", "wheel", "touch", "progress", "hash"];

/// Best-effort AST plus every lexical and syntactic diagnostic.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    /// `None` only when the `mpd` header itself is missing.
    pub ast: Option<Program>,
    /// Lexer diagnostics followed by parser diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse MPD source text.
pub fn parse(source: &str) -> ParseOutput {
    let LexOutput {
        tokens,
        mut diagnostics,
    } = lex(source);
    let mut parser = Parser::new(source, tokens);
    let ast = parser.parse_program();
    diagnostics.append(&mut parser.diagnostics);
    ParseOutput { ast, diagnostics }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryMode {
    Plain,
    Camera,
    Navigation,
}

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    prev_end: Position,
    diagnostics: Vec<Diagnostic>,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str, tokens: Vec<Token>) -> Self {
        Self {
            src,
            tokens,
            pos: 0,
            prev_end: Position::start(),
            diagnostics: Vec::new(),
        }
    }

    // ── token cursor ──────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is_eof() {
            self.pos += 1;
            self.prev_end = token.end;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    fn at_keyword(&self, word: &str) -> bool {
        self.peek().is_keyword(word)
    }

    fn at_punct(&self, punct: &str) -> bool {
        self.peek().is_punct(punct)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> bool {
        if self.eat_punct(punct) {
            true
        } else {
            self.unexpected(&format!("`{punct}`"));
            false
        }
    }

    fn expect_keyword(&mut self, word: &str) -> bool {
        if self.eat_keyword(word) {
            true
        } else {
            self.unexpected(&format!("`{word}`"));
            false
        }
    }

    fn span_from(&self, start: Position) -> Span {
        let end = if self.prev_end.offset < start.offset {
            start
        } else {
            self.prev_end
        };
        Span::new(start, end)
    }

    // ── diagnostics ───────────────────────────────────────────────────────

    fn unexpected(&mut self, expected: &str) {
        let token = self.peek().clone();
        let diagnostic = if token.is_eof() {
            Diagnostic::error(
                codes::UNEXPECTED_EOF,
                format!("unexpected end of input, expected {expected}"),
                token.span(),
            )
        } else {
            Diagnostic::error(
                codes::UNEXPECTED_TOKEN,
                format!("expected {expected}, found `{}`", token.image),
                token.span(),
            )
        };
        self.diagnostics.push(diagnostic);
    }

    fn error(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    fn warning(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::warning(code, message, span));
    }

    /// Skip one token after a loop iteration that made no progress. Reports
    /// only when the iteration itself stayed silent.
    fn recover(&mut self, before_diagnostics: usize, context: &str) {
        if self.diagnostics.len() == before_diagnostics {
            self.unexpected(context);
        }
        self.advance();
    }

    /// `{ item* }`. Returns nothing when the opening brace is missing.
    fn parse_block<T>(
        &mut self,
        context: &str,
        mut item: impl FnMut(&mut Self) -> Option<T>,
    ) -> Vec<T> {
        let mut items = Vec::new();
        if !self.expect_punct("{") {
            return items;
        }
        while !self.at_punct("}") && !self.at_eof() {
            let before = self.pos;
            let reported = self.diagnostics.len();
            if let Some(parsed) = item(self) {
                items.push(parsed);
            }
            if self.pos == before {
                self.recover(reported, context);
            }
        }
        self.expect_punct("}");
        items
    }

    /// Identifier, keyword or string used as a name.
    fn parse_name(&mut self, what: &str) -> Option<String> {
        let token = self.peek();
        if token.is_word() || token.kind == TokenKind::String {
            Some(self.advance().text().to_string())
        } else {
            self.unexpected(what);
            None
        }
    }

    fn parse_optional_name(&mut self) -> Option<String> {
        let token = self.peek();
        if token.kind == TokenKind::Identifier || token.kind == TokenKind::String {
            Some(self.advance().text().to_string())
        } else {
            None
        }
    }

    // ── program ───────────────────────────────────────────────────────────

    fn parse_program(&mut self) -> Option<Program> {
        let start = self.peek().start;
        if !self.expect_keyword("mpd") {
            return None;
        }
        let version = self.parse_version();

        let mut items = Vec::new();
        let mut deck_seen = false;
        while !self.at_eof() {
            let before = self.pos;
            let reported = self.diagnostics.len();
            if deck_seen {
                self.unexpected("end of input after `deck` block");
                deck_seen = false;
            }
            if self.at_keyword("deck") && items.is_empty() {
                items.push(Item::Deck(self.parse_deck()));
                deck_seen = true;
            } else if let Some(item) = self.parse_item() {
                items.push(item);
            }
            if self.pos == before {
                self.recover(reported, "a declaration");
            }
        }

        Some(Program {
            version,
            items,
            span: Span::new(start, self.peek().end),
        })
    }

    fn parse_version(&mut self) -> Version {
        let start = self.peek().start;
        if !matches!(self.peek().kind, TokenKind::Number | TokenKind::Int) {
            self.unexpected("a version number");
            return Version {
                raw: String::new(),
                parts: Vec::new(),
                span: Span::point(start),
            };
        }
        let mut raw = self.advance().image;
        while self.at_punct(".") && matches!(self.peek_at(1).kind, TokenKind::Int | TokenKind::Number)
        {
            self.advance();
            raw.push('.');
            raw.push_str(&self.advance().image);
        }
        let parts = raw
            .split('.')
            .map(|part| part.parse::<u64>().unwrap_or_default())
            .collect();
        Version {
            raw,
            parts,
            span: self.span_from(start),
        }
    }

    fn parse_deck(&mut self) -> Deck {
        let start = self.peek().start;
        self.expect_keyword("deck");
        let items = self.parse_block("a deck declaration", |p| p.parse_item());
        Deck {
            items,
            span: self.span_from(start),
        }
    }

    fn parse_item(&mut self) -> Option<Item> {
        let token = self.peek();
        if !token.is_word() {
            return None;
        }
        let word = token.image.clone();
        if token.kind == TokenKind::Identifier {
            return Some(Item::Unknown(self.parse_unknown_block()));
        }
        let item = match word.as_str() {
            "deck" => Item::Deck(self.parse_deck()),
            "meta" => Item::Meta(self.parse_meta()),
            "let" => {
                let decl = self.parse_let();
                self.eat_punct(";");
                Item::Const(decl)
            }
            "use" => Item::Plugin(self.parse_plugin()),
            "diagram" => Item::Diagram(self.parse_diagram()),
            "runtime" => Item::Runtime(self.parse_runtime()),
            "selectors" => Item::Selectors(self.parse_selectors()),
            "styles" => Item::Styles(self.parse_styles()),
            "scene" => Item::Scene(self.parse_scene()),
            "binding" => Item::Binding(self.parse_binding()),
            _ => Item::Unknown(self.parse_unknown_block()),
        };
        Some(item)
    }

    /// Verbatim capture: a balanced `{ ... }` block if one follows,
    /// otherwise the rest of the line.
    fn parse_unknown_block(&mut self) -> UnknownBlock {
        let name_token = self.advance();
        let start = name_token.start;
        let raw_start = self.peek().start.offset;
        let mut raw_end = name_token.end.offset;

        if self.at_punct("{") {
            let mut depth = 0usize;
            loop {
                if self.at_eof() {
                    self.unexpected("`}`");
                    break;
                }
                let token = self.advance();
                raw_end = token.end.offset;
                if token.is_punct("{") {
                    depth += 1;
                } else if token.is_punct("}") {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
            }
        } else {
            while !self.at_eof() && self.peek().start.line == name_token.end.line {
                raw_end = self.advance().end.offset;
            }
        }

        let raw = if raw_end > raw_start {
            self.src[raw_start..raw_end].to_string()
        } else {
            String::new()
        };
        UnknownBlock {
            name: name_token.image,
            raw,
            span: self.span_from(start),
        }
    }

    fn parse_meta(&mut self) -> MetaDecl {
        let start = self.peek().start;
        self.expect_keyword("meta");
        let entries = self.parse_entries(EntryMode::Plain);
        self.eat_punct(";");
        MetaDecl {
            entries,
            span: self.span_from(start),
        }
    }

    fn parse_let(&mut self) -> ConstDecl {
        let start = self.peek().start;
        self.expect_keyword("let");
        let name = self.parse_name("a variable name").unwrap_or_default();
        if !self.peek().is_operator("=") {
            self.unexpected("`=`");
        } else {
            self.advance();
        }
        let value = self.parse_expr();
        ConstDecl {
            name,
            value,
            span: self.span_from(start),
        }
    }

    fn parse_plugin(&mut self) -> PluginDecl {
        let start = self.peek().start;
        self.expect_keyword("use");
        let source = if self.peek().kind == TokenKind::String {
            self.advance().text().to_string()
        } else {
            self.unexpected("a plugin string");
            String::new()
        };
        let alias = if self.eat_keyword("as") {
            self.parse_name("a plugin alias")
        } else {
            None
        };
        let options = if self.at_punct("{") {
            Some(self.parse_object())
        } else {
            None
        };
        self.eat_punct(";");
        PluginDecl {
            source,
            alias,
            options,
            span: self.span_from(start),
        }
    }

    fn parse_diagram(&mut self) -> DiagramDecl {
        let start = self.peek().start;
        self.expect_keyword("diagram");
        let name = self.parse_optional_name();
        let mut source = None;
        let mut config = None;
        let mut assets = None;
        self.parse_block("a diagram setting", |p| {
            if p.eat_keyword("mermaid") {
                let token = p.peek().clone();
                match (&token.kind, &token.value) {
                    (TokenKind::Heredoc, TokenValue::Heredoc { tag, body }) => {
                        source = Some(DiagramSource::Heredoc {
                            tag: tag.clone(),
                            body: body.clone(),
                        });
                        p.advance();
                    }
                    (TokenKind::String, _) => {
                        source = Some(DiagramSource::String(token.text().to_string()));
                        p.advance();
                    }
                    _ => p.unexpected("a heredoc or string with diagram source"),
                }
            } else if p.eat_keyword("config") {
                config = Some(p.parse_object());
            } else if p.eat_keyword("assets") {
                assets = Some(p.parse_object());
            } else {
                return None;
            }
            Some(())
        });
        DiagramDecl {
            name,
            source,
            config,
            assets,
            span: self.span_from(start),
        }
    }

    fn parse_runtime(&mut self) -> RuntimeDecl {
        let start = self.peek().start;
        self.expect_keyword("runtime");
        let sections = self.parse_block("a runtime section", |p| {
            let section_start = p.peek().start;
            let (kind, mode) = if p.eat_keyword("camera") {
                (RuntimeSectionKind::Camera, EntryMode::Camera)
            } else if p.eat_keyword("overlay") {
                (RuntimeSectionKind::Overlay, EntryMode::Plain)
            } else if p.eat_keyword("navigation") {
                (RuntimeSectionKind::Navigation, EntryMode::Navigation)
            } else if p.eat_keyword("performance") {
                (RuntimeSectionKind::Performance, EntryMode::Plain)
            } else {
                return None;
            };
            let entries = p.parse_entries(mode);
            Some(RuntimeSection {
                kind,
                entries,
                span: p.span_from(section_start),
            })
        });
        RuntimeDecl {
            sections,
            span: self.span_from(start),
        }
    }

    fn parse_selectors(&mut self) -> SelectorsDecl {
        let start = self.peek().start;
        self.expect_keyword("selectors");
        let entries = self.parse_block("a selector entry", |p| {
            let entry_start = p.peek().start;
            let token = p.peek();
            if !(token.is_word() || token.kind == TokenKind::String) {
                return None;
            }
            let name = p.advance().text().to_string();
            p.expect_punct(":");
            let target = p.parse_target();
            p.eat_punct(",");
            Some(SelectorEntry {
                name,
                target,
                span: p.span_from(entry_start),
            })
        });
        SelectorsDecl {
            entries,
            span: self.span_from(start),
        }
    }

    fn parse_styles(&mut self) -> StylesDecl {
        let start = self.peek().start;
        self.expect_keyword("styles");
        let entries = self.parse_entries(EntryMode::Plain);
        StylesDecl {
            entries,
            span: self.span_from(start),
        }
    }

    /// `{ key: value, ... }` as a list of entries.
    fn parse_entries(&mut self, mode: EntryMode) -> Vec<ObjectEntry> {
        self.parse_block("an entry", |p| p.parse_entry(mode))
    }

    fn parse_entry(&mut self, mode: EntryMode) -> Option<ObjectEntry> {
        let start = self.peek().start;
        let token = self.peek();
        if !(token.is_word() || token.kind == TokenKind::String) {
            return None;
        }
        let key_token = self.advance();
        let key = key_token.text().to_string();
        self.expect_punct(":");

        let value = match mode {
            EntryMode::Camera if key == "bounds" => self.parse_enum_value(&key, CAMERA_BOUNDS),
            EntryMode::Navigation => {
                if !NAVIGATION_TOGGLES.contains(&key.as_str()) {
                    self.warning(
                        codes::UNKNOWN_TOGGLE,
                        format!("unknown navigation toggle `{key}`"),
                        key_token.span(),
                    );
                }
                let value = self.parse_expr();
                if !matches!(
                    value.kind,
                    ExprKind::Literal(Literal {
                        value: LiteralValue::Boolean(_),
                        ..
                    })
                ) {
                    self.error(
                        codes::INVALID_VALUE,
                        format!("navigation toggle `{key}` expects true or false"),
                        value.span,
                    );
                }
                value
            }
            _ => self.parse_expr(),
        };
        self.eat_punct(",");
        Some(ObjectEntry {
            key,
            value,
            span: self.span_from(start),
        })
    }

    /// Bare word or string drawn from a fixed set, stored as a string literal.
    fn parse_enum_value(&mut self, key: &str, allowed: &[&str]) -> Expr {
        let token = self.peek().clone();
        if !(token.is_word() || token.kind == TokenKind::String) {
            return self.parse_expr();
        }
        self.advance();
        let text = token.text().to_string();
        if !allowed.contains(&text.as_str()) {
            self.error(
                codes::INVALID_VALUE,
                format!(
                    "invalid value `{text}` for `{key}` (expected one of: {})",
                    allowed.join(", ")
                ),
                token.span(),
            );
        }
        Expr::new(
            ExprKind::Literal(Literal {
                value: LiteralValue::String(text),
                raw: token.image.clone(),
            }),
            token.span(),
        )
    }

    // ── scenes and steps ──────────────────────────────────────────────────

    fn parse_scene(&mut self) -> SceneDecl {
        let start = self.peek().start;
        self.expect_keyword("scene");
        let name = self.parse_optional_name();
        let steps = self.parse_block("a `step`", |p| {
            if p.at_keyword("step") {
                Some(p.parse_step())
            } else {
                None
            }
        });
        SceneDecl {
            name,
            steps,
            span: self.span_from(start),
        }
    }

    fn parse_step(&mut self) -> Step {
        let start = self.peek().start;
        self.expect_keyword("step");
        let name = self.parse_name("a step name").unwrap_or_default();
        let title = if self.eat_keyword("as") {
            if self.peek().kind == TokenKind::String {
                Some(self.advance().text().to_string())
            } else {
                self.unexpected("a step title string");
                None
            }
        } else {
            None
        };

        let mut statements = Vec::new();
        let mut bindings = Vec::new();
        self.parse_block("a statement", |p| {
            if p.at_keyword("binding") {
                bindings.push(p.parse_binding());
                Some(())
            } else {
                let statement = p.parse_statement()?;
                statements.push(statement);
                Some(())
            }
        });
        Step {
            name,
            title,
            statements,
            bindings,
            span: self.span_from(start),
        }
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        let start = self.peek().start;
        let token = self.peek();
        if token.kind != TokenKind::Keyword {
            return None;
        }
        let kind = match token.image.as_str() {
            "focus" => {
                self.advance();
                StatementKind::Focus(self.parse_focus())
            }
            "do" => {
                self.advance();
                StatementKind::Do(self.parse_call_expr())
            }
            "let" => StatementKind::Let(self.parse_let()),
            "assert" => {
                self.advance();
                let condition = self.parse_expr();
                let message = if self.eat_keyword("else") {
                    Some(self.parse_expr())
                } else {
                    None
                };
                StatementKind::Assert(AssertStmt { condition, message })
            }
            "meta" => StatementKind::Meta(self.parse_meta()),
            _ => return None,
        };
        self.eat_punct(";");
        Some(Statement {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_focus(&mut self) -> FocusStmt {
        let target = self.parse_target();
        let mut focus = FocusStmt {
            target,
            pad: None,
            align: None,
            lock: None,
        };
        loop {
            if self.eat_keyword("pad") {
                focus.pad = Some(self.parse_expr());
            } else if self.eat_keyword("align") {
                focus.align = self.parse_name("an alignment");
            } else if self.eat_keyword("lock") {
                focus.lock = Some(self.parse_expr());
            } else {
                break;
            }
        }
        focus
    }

    // ── bindings ──────────────────────────────────────────────────────────

    fn parse_binding(&mut self) -> BindingDecl {
        let start = self.peek().start;
        self.expect_keyword("binding");
        let name = self.parse_optional_name();
        let mut priority = None;
        let mut rules = Vec::new();
        self.parse_block("`on` or `priority`", |p| {
            if p.eat_keyword("priority") {
                if p.peek().kind == TokenKind::Int {
                    priority = p.advance().image.parse::<i64>().ok();
                } else {
                    p.unexpected("an integer priority");
                }
                p.eat_punct(";");
                Some(())
            } else if p.at_keyword("on") {
                rules.push(p.parse_rule());
                Some(())
            } else {
                None
            }
        });
        BindingDecl {
            name,
            priority,
            rules,
            span: self.span_from(start),
        }
    }

    fn parse_rule(&mut self) -> BindingRule {
        let start = self.peek().start;
        self.expect_keyword("on");
        let event = self.parse_event_spec();
        let target = if self.eat_keyword("target") {
            Some(self.parse_target())
        } else {
            None
        };
        let when = if self.eat_keyword("when") {
            Some(self.parse_expr())
        } else {
            None
        };
        let actions = self.parse_block("a statement", |p| p.parse_statement());
        BindingRule {
            event,
            target,
            when,
            actions,
            span: self.span_from(start),
        }
    }

    fn parse_event_spec(&mut self) -> EventSpec {
        let start = self.peek().start;
        let mut spec = EventSpec {
            kind: None,
            key: None,
            delay: None,
            name: None,
            span: Span::point(start),
        };
        let token = self.peek().clone();
        if !token.is_word() {
            self.unexpected("an event kind");
            return spec;
        }
        self.advance();
        spec.kind = EventKind::from_name(&token.image);
        match spec.kind {
            None => {
                let allowed: Vec<_> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
                self.error(
                    codes::INVALID_VALUE,
                    format!(
                        "unknown event kind `{}` (expected one of: {})",
                        token.image,
                        allowed.join(", ")
                    ),
                    token.span(),
                );
            }
            Some(EventKind::Key) => {
                if self.peek().kind == TokenKind::String {
                    spec.key = Some(self.advance().text().to_string());
                }
            }
            Some(EventKind::Timer) => {
                let next = self.peek().clone();
                match (next.kind, &next.value) {
                    (TokenKind::Duration, TokenValue::Millis(ms)) => {
                        spec.delay = Some(Literal {
                            value: LiteralValue::Duration(*ms),
                            raw: next.image.clone(),
                        });
                        self.advance();
                    }
                    (TokenKind::Int, TokenValue::Number(ms)) => {
                        spec.delay = Some(Literal {
                            value: LiteralValue::Int(*ms as i64),
                            raw: next.image.clone(),
                        });
                        self.advance();
                    }
                    _ => {}
                }
            }
            Some(EventKind::Custom) => {
                if self.peek().kind == TokenKind::String {
                    spec.name = Some(self.advance().text().to_string());
                } else {
                    self.unexpected("a custom event name string");
                }
            }
            Some(EventKind::Click) | Some(EventKind::Hover) => {}
        }
        spec.span = self.span_from(start);
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::diagnostic::{Severity, has_errors};

    const DECK: &str = r#"
mpd 1.0
deck {
  meta { title: "Checkout flow", author: "ops" }
  diagram main {
    mermaid <<<MMD
flowchart LR
  A --> B
MMD>>>
    config { theme: "dark" }
  }
  runtime {
    camera { bounds: diagram, padding: 24 }
    navigation { keyboard: true, click: false }
  }
  selectors { entry: node A, path: edge A -> B }
  let accent = #ff8800
  scene intro {
    step overview as "Overview" {
      focus node A pad 24 align center
      do style.highlight(node A, color: $accent)
      meta { errorPolicy: "continueOnError" }
      binding { on key "ArrowRight" { do nav.next() } }
    }
    step details {
      focus union(node A, node B)
      assert 1 + 2 * 3 == 7 else "math"
    }
  }
  binding global {
    priority 10
    on click target node A { do overlay.callout(text: "Clicked") }
    on timer 2s { do noop() }
  }
}
"#;

    #[test]
    fn parses_full_deck() {
        let out = parse(DECK);
        assert!(
            !has_errors(&out.diagnostics),
            "unexpected diagnostics: {:?}",
            out.diagnostics
        );
        let program = out.ast.expect("program");
        assert_eq!(program.version.raw, "1.0");
        assert_eq!(program.items.len(), 1);
        let items = program.deck_items();
        assert_eq!(items.len(), 7);

        let Item::Scene(scene) = items[5] else {
            panic!("expected scene, got {:?}", items[5]);
        };
        assert_eq!(scene.name.as_deref(), Some("intro"));
        assert_eq!(scene.steps.len(), 2);
        let overview = &scene.steps[0];
        assert_eq!(overview.title.as_deref(), Some("Overview"));
        assert_eq!(overview.statements.len(), 3);
        assert_eq!(overview.bindings.len(), 1);

        let StatementKind::Focus(focus) = &overview.statements[0].kind else {
            panic!("expected focus");
        };
        assert_eq!(focus.align.as_deref(), Some("center"));
        assert!(matches!(focus.target.kind, TargetKind::Node(TargetRef::Id(ref id)) if id == "A"));

        let Item::Binding(binding) = items[6] else {
            panic!("expected binding");
        };
        assert_eq!(binding.priority, Some(10));
        assert_eq!(binding.rules.len(), 2);
        assert_eq!(binding.rules[1].event.kind, Some(EventKind::Timer));
        assert_eq!(
            binding.rules[1].event.delay.as_ref().map(|d| d.value.clone()),
            Some(LiteralValue::Duration(2000.0))
        );
    }

    #[test]
    fn flat_documents_hold_items_directly() {
        let out = parse("mpd 1\nlet x = 1\nscene { step a { do noop() } }");
        let program = out.ast.expect("program");
        assert_eq!(program.items.len(), 2);
        assert!(matches!(program.items[0], Item::Const(_)));
    }

    #[test]
    fn missing_header_yields_no_ast() {
        let out = parse("scene { }");
        assert!(out.ast.is_none());
        assert!(has_errors(&out.diagnostics));
        assert_eq!(
            out.diagnostics[0].code.as_deref(),
            Some(codes::UNEXPECTED_TOKEN)
        );
    }

    #[test]
    fn dotted_versions() {
        let program = parse("mpd 1.0.2").ast.expect("program");
        assert_eq!(program.version.raw, "1.0.2");
        assert_eq!(program.version.parts, vec![1, 0, 2]);
    }

    #[test]
    fn unknown_blocks_are_captured_verbatim() {
        let src = "mpd 1.0\ntheme { colors { primary: #fff } }\nextras one two\nscene { }";
        let out = parse(src);
        assert!(!has_errors(&out.diagnostics), "{:?}", out.diagnostics);
        let program = out.ast.expect("program");
        let Item::Unknown(block) = &program.items[0] else {
            panic!("expected unknown block");
        };
        assert_eq!(block.name, "theme");
        assert_eq!(block.raw, "{ colors { primary: #fff } }");
        let Item::Unknown(line) = &program.items[1] else {
            panic!("expected unknown line");
        };
        assert_eq!(line.raw, "one two");
        assert!(matches!(program.items[2], Item::Scene(_)));
    }

    #[test]
    fn broken_step_still_yields_partial_ast() {
        let src = "mpd 1.0\nscene { step a { do ) focus node B } step b { } }";
        let out = parse(src);
        assert!(has_errors(&out.diagnostics));
        let program = out.ast.expect("partial program");
        let Item::Scene(scene) = &program.items[0] else {
            panic!("expected scene");
        };
        assert_eq!(scene.steps.len(), 2);
        assert!(
            scene.steps[0]
                .statements
                .iter()
                .any(|s| matches!(s.kind, StatementKind::Focus(_)))
        );
    }

    #[test]
    fn unterminated_input_reports_eof() {
        let out = parse("mpd 1.0\nscene { step a {");
        assert!(
            out.diagnostics
                .iter()
                .any(|d| d.code.as_deref() == Some(codes::UNEXPECTED_EOF))
        );
        assert!(out.ast.is_some());
    }

    #[test]
    fn invalid_enumerations_are_reported() {
        let src = "mpd 1.0\nruntime { camera { bounds: sideways } navigation { joystick: true, keyboard: 3 } }\nbinding { on swipe { } }";
        let out = parse(src);
        let codes_seen: Vec<_> = out
            .diagnostics
            .iter()
            .map(|d| (d.code.clone().unwrap_or_default(), d.severity))
            .collect();
        assert!(codes_seen.contains(&(codes::INVALID_VALUE.to_string(), Severity::Error)));
        assert!(codes_seen.contains(&(codes::UNKNOWN_TOGGLE.to_string(), Severity::Warning)));
        assert_eq!(
            codes_seen
                .iter()
                .filter(|(c, _)| c == codes::INVALID_VALUE)
                .count(),
            3
        );
    }

    #[test]
    fn unterminated_heredoc_is_a_syntax_error() {
        let out = parse("mpd 1.0\ndiagram { mermaid <<<MMD\nflowchart LR\n}");
        assert!(has_errors(&out.diagnostics));
    }

    #[test]
    fn garbage_terminates() {
        let out = parse("mpd 1.0 { } ) ( ??? step , : deck");
        assert!(has_errors(&out.diagnostics));
        assert!(out.ast.is_some());
    }
}
