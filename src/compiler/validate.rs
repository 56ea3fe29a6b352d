//! Semantic checks over a parsed [`Program`].
//!
//! Every check runs over the whole tree; nothing exits early and the tree is
//! never modified.

use std::collections::HashSet;

use super::ast::*;
use super::diagnostic::{Diagnostic, Span, codes};
use crate::SUPPORTED_MPD_VERSION;

/// Run all semantic checks and return their diagnostics in tree order.
pub fn validate(program: &Program) -> Vec<Diagnostic> {
    let mut validator = Validator::default();
    validator.check_version(&program.version);
    for item in &program.items {
        validator.item(item);
    }
    validator.diagnostics
}

/// Whether `version` is the supported version or its integral prefix.
pub fn is_supported_version(version: &Version) -> bool {
    let integral = SUPPORTED_MPD_VERSION
        .split('.')
        .next()
        .unwrap_or(SUPPORTED_MPD_VERSION);
    version.raw == SUPPORTED_MPD_VERSION || version.raw == integral
}

#[derive(Default)]
struct Validator {
    diagnostics: Vec<Diagnostic>,
}

impl Validator {
    fn check_version(&mut self, version: &Version) {
        if version.raw.is_empty() || is_supported_version(version) {
            return;
        }
        self.diagnostics.push(Diagnostic::warning(
            codes::VERSION_MISMATCH,
            format!(
                "document declares mpd {}, this compiler supports {}",
                version.raw, SUPPORTED_MPD_VERSION
            ),
            version.span,
        ));
    }

    fn item(&mut self, item: &Item) {
        match item {
            Item::Deck(deck) => {
                for item in &deck.items {
                    self.item(item);
                }
            }
            Item::Diagram(diagram) => {
                for expr in diagram.config.iter().chain(diagram.assets.iter()) {
                    self.expr(expr);
                }
            }
            Item::Runtime(runtime) => {
                for section in &runtime.sections {
                    self.entries(&section.entries);
                }
            }
            Item::Selectors(selectors) => {
                for entry in &selectors.entries {
                    self.target(&entry.target);
                }
            }
            Item::Styles(styles) => self.entries(&styles.entries),
            Item::Const(decl) => self.expr(&decl.value),
            Item::Scene(scene) => self.scene(scene),
            Item::Binding(binding) => self.binding(binding),
            Item::Plugin(plugin) => {
                if let Some(options) = &plugin.options {
                    self.expr(options);
                }
            }
            Item::Meta(meta) => self.entries(&meta.entries),
            Item::Unknown(block) => self.diagnostics.push(Diagnostic::warning(
                codes::UNKNOWN_BLOCK,
                format!("unknown block `{}` is kept but ignored", block.name),
                block.span,
            )),
        }
    }

    fn scene(&mut self, scene: &SceneDecl) {
        let mut seen = HashSet::new();
        for step in &scene.steps {
            if !seen.insert(step.name.as_str()) {
                self.diagnostics.push(Diagnostic::error(
                    codes::DUPLICATE_STEP,
                    format!("duplicate step `{}` in scene", step.name),
                    step.span,
                ));
            }
            for statement in &step.statements {
                self.statement(statement);
            }
            for binding in &step.bindings {
                self.binding(binding);
            }
        }
    }

    fn binding(&mut self, binding: &BindingDecl) {
        for rule in &binding.rules {
            if let Some(target) = &rule.target {
                self.target(target);
            }
            if let Some(when) = &rule.when {
                self.expr(when);
            }
            for action in &rule.actions {
                self.statement(action);
            }
        }
    }

    fn statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Focus(focus) => {
                self.target(&focus.target);
                for expr in focus.pad.iter().chain(focus.lock.iter()) {
                    self.expr(expr);
                }
            }
            StatementKind::Do(call) => self.call(call),
            StatementKind::Let(decl) => self.expr(&decl.value),
            StatementKind::Assert(assert) => {
                self.expr(&assert.condition);
                if let Some(message) = &assert.message {
                    self.expr(message);
                }
            }
            StatementKind::Meta(meta) => self.entries(&meta.entries),
        }
    }

    fn entries(&mut self, entries: &[ObjectEntry]) {
        for entry in entries {
            self.expr(&entry.value);
        }
    }

    fn call(&mut self, call: &CallExpr) {
        for arg in &call.args {
            self.expr(&arg.value);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Var(_) => {}
            ExprKind::Object(object) => self.entries(&object.entries),
            ExprKind::Array(array) => {
                for item in &array.items {
                    self.expr(item);
                }
            }
            ExprKind::Call(call) => self.call(call),
            ExprKind::Unary(unary) => self.expr(&unary.operand),
            ExprKind::Binary(binary) => {
                self.expr(&binary.left);
                self.expr(&binary.right);
            }
            ExprKind::Target(target) => self.target(target),
        }
    }

    fn target(&mut self, target: &Target) {
        match &target.kind {
            TargetKind::Node(_) | TargetKind::Subgraph(_) | TargetKind::Edge(EdgeRef::Id(_)) => {}
            TargetKind::Edge(EdgeRef::Between(from, to)) => {
                if from.is_wildcard() || to.is_wildcard() {
                    self.error(
                        codes::EDGE_WILDCARD,
                        "edge endpoints must name nodes, not `*`",
                        target.span,
                    );
                }
            }
            TargetKind::Css(value) => self.non_empty("css", value, target.span),
            TargetKind::Id(value) => self.non_empty("id", value, target.span),
            TargetKind::Text(value) => self.non_empty("text", value, target.span),
            TargetKind::Group(items) | TargetKind::Union(items) | TargetKind::Intersect(items) => {
                for item in items {
                    self.target(item);
                }
            }
            TargetKind::Except(base, removed) => {
                if base.is_wildcard() && removed.is_wildcard() {
                    self.error(
                        codes::WILDCARD_EXCEPT,
                        "`except` cannot take `*` on both sides",
                        target.span,
                    );
                }
                self.target(base);
                self.target(removed);
            }
        }
    }

    fn non_empty(&mut self, what: &str, value: &str, span: Span) {
        if value.is_empty() {
            self.error(
                codes::EMPTY_TARGET,
                format!("`{what}` target needs a non-empty string"),
                span,
            );
        }
    }

    fn error(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parser::parse;

    fn diagnostics(src: &str) -> Vec<Diagnostic> {
        let out = parse(src);
        validate(&out.ast.expect("program"))
    }

    fn count(diagnostics: &[Diagnostic], code: &str) -> usize {
        diagnostics
            .iter()
            .filter(|d| d.code.as_deref() == Some(code))
            .count()
    }

    #[test]
    fn accepts_supported_and_integral_versions() {
        assert_eq!(count(&diagnostics("mpd 1.0"), codes::VERSION_MISMATCH), 0);
        assert_eq!(count(&diagnostics("mpd 1"), codes::VERSION_MISMATCH), 0);
        let found = diagnostics("mpd 2.1");
        assert_eq!(count(&found, codes::VERSION_MISMATCH), 1);
        assert!(!found[0].is_error());
    }

    #[test]
    fn flags_each_repeated_step_once() {
        let src = "mpd 1.0\nscene { step intro { } step other { } step intro { } step intro { } }";
        let found = diagnostics(src);
        assert_eq!(count(&found, codes::DUPLICATE_STEP), 2);
    }

    #[test]
    fn same_step_name_in_different_scenes_is_fine() {
        let src = "mpd 1.0\nscene a { step intro { } }\nscene b { step intro { } }";
        assert_eq!(count(&diagnostics(src), codes::DUPLICATE_STEP), 0);
    }

    #[test]
    fn unknown_blocks_warn() {
        let found = diagnostics("mpd 1.0\ndeck { theme { x: 1 } }");
        assert_eq!(count(&found, codes::UNKNOWN_BLOCK), 1);
        assert!(!found.iter().any(Diagnostic::is_error));
    }

    #[test]
    fn malformed_targets_are_found_everywhere() {
        let src = r#"
mpd 1.0
selectors { bad: edge (*, B) }
let t = group(css "", node A)
scene {
  step s {
    focus except(node *, node *)
    do style.highlight(text "")
    binding { on click target id "" { focus edge A -> * } }
  }
}
"#;
        let found = diagnostics(src);
        assert_eq!(count(&found, codes::EDGE_WILDCARD), 2);
        assert_eq!(count(&found, codes::EMPTY_TARGET), 3);
        assert_eq!(count(&found, codes::WILDCARD_EXCEPT), 1);
    }

    #[test]
    fn edge_id_wildcard_is_allowed() {
        let found = diagnostics("mpd 1.0\nscene { step s { focus edge * } }");
        assert!(found.is_empty(), "{found:?}");
    }
}
